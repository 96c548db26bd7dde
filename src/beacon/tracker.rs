// Beacon Tracker - Presence sightings keyed by radio address
//
// A device that keeps broadcasting only refreshes its timestamp; the sighting is
// logged once, when the address is first seen.

use crate::wire::{advertised_name, RadioAddress};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Age after which a sighting is dropped by the sweep
pub const BCAST_TIMEOUT_MS: u64 = 10_000;

/// Display name used when a device advertises no valid name
pub const UNKNOWN_NAME: &str = "unknown";

/// A device seen broadcasting presence
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BeaconEntry {
    address: RadioAddress,
    name: String,
    last_seen: u64,
}

impl BeaconEntry {
    /// Get the device address
    pub fn address(&self) -> &RadioAddress {
        &self.address
    }

    /// Get the display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the last sighting timestamp (ms)
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Milliseconds since the last sighting
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_seen)
    }
}

/// Table of recent presence sightings
#[derive(Debug, Default)]
pub struct BeaconTracker {
    entries: HashMap<RadioAddress, BeaconEntry>,
}

impl BeaconTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence sighting
    ///
    /// Returns `true` when a new entry was created, `false` when an existing one
    /// was refreshed.
    pub fn observe(&mut self, address: RadioAddress, raw_name: &[u8], now: u64) -> bool {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.last_seen = now;
            return false;
        }

        let name = advertised_name(raw_name).unwrap_or(UNKNOWN_NAME).to_string();
        info!(address = %address, name = %name, "Thing sending presence");

        self.entries.insert(
            address,
            BeaconEntry {
                address,
                name,
                last_seen: now,
            },
        );
        true
    }

    /// Remove every entry last seen before `now - timeout_ms`
    pub fn expire_older_than(&mut self, now: u64, timeout_ms: u64) -> Vec<RadioAddress> {
        let expired: Vec<RadioAddress> = self
            .entries
            .values()
            .filter(|e| e.age(now) > timeout_ms)
            .map(|e| e.address)
            .collect();

        for address in &expired {
            self.entries.remove(address);
        }
        expired
    }

    /// Remove the entry for a device that started connecting
    pub fn consume(&mut self, address: &RadioAddress) -> Option<BeaconEntry> {
        self.entries.remove(address)
    }

    /// Get the entry for an address
    pub fn get(&self, address: &RadioAddress) -> Option<&BeaconEntry> {
        self.entries.get(address)
    }

    /// Check if an address has a live sighting
    pub fn contains(&self, address: &RadioAddress) -> bool {
        self.entries.contains_key(address)
    }

    /// Number of tracked sightings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all sightings, ordered by address
    pub fn entries(&self) -> Vec<BeaconEntry> {
        let mut list: Vec<BeaconEntry> = self.entries.values().cloned().collect();
        list.sort_by_key(|e| e.address);
        list
    }

    /// Drop every sighting
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
