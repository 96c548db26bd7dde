// Radio Address - Fixed-width device identifier
// Eight raw bytes, compared byte-for-byte and used as the key of every lookup table

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a textual radio address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid address length: expected 8 octets, got {0}")]
    InvalidLength(usize),

    #[error("Invalid address octet: {0}")]
    InvalidOctet(String),

    #[error("Invalid address slice: expected 8 bytes, got {0}")]
    InvalidSlice(usize),
}

/// 8-byte radio device address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RadioAddress([u8; 8]);

impl RadioAddress {
    /// Size of an address on the wire
    pub const SIZE: usize = 8;

    /// The unassigned address
    pub const ZERO: RadioAddress = RadioAddress([0u8; 8]);

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create from the first 8 bytes of a slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let raw: [u8; 8] = bytes
            .get(..Self::SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(AddressError::InvalidSlice(bytes.len()))?;
        Ok(Self(raw))
    }

    /// Generate a random address
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Check for the unassigned address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }

    /// Lower-case hex without separators, used as a storage key
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RadioAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RadioAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RadioAddress({})", self)
    }
}

impl FromStr for RadioAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split(':').collect();
        if octets.len() != Self::SIZE {
            return Err(AddressError::InvalidLength(octets.len()));
        }

        let mut bytes = [0u8; 8];
        for (slot, octet) in bytes.iter_mut().zip(octets) {
            if octet.len() != 2 {
                return Err(AddressError::InvalidOctet(octet.to_string()));
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| AddressError::InvalidOctet(octet.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; 8]> for RadioAddress {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl Serialize for RadioAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for RadioAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 8]>::deserialize(deserializer).map(Self)
        }
    }
}
