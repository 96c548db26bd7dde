// Source Table - Arena of pollable sources indexed by stable ids
//
// Removing a source vacates its slot; the slot only becomes reusable after
// reclaim(), which the event loop calls once a poll pass is over.

use serde::Serialize;
use std::fmt;

/// Stable handle of a registered source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(usize);

impl SourceId {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src{}", self.0)
    }
}

/// Slot arena for pollable sources
#[derive(Debug)]
pub struct SourceTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    released: Vec<usize>,
    len: usize,
}

impl<T> Default for SourceTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            released: Vec::new(),
            len: 0,
        }
    }
}

impl<T> SourceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    pub fn insert(&mut self, source: T) -> SourceId {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(source);
                SourceId(index)
            }
            None => {
                self.slots.push(Some(source));
                SourceId(self.slots.len() - 1)
            }
        }
    }

    /// Unregister a source, vacating its slot
    pub fn remove(&mut self, id: SourceId) -> Option<T> {
        let source = self.slots.get_mut(id.0)?.take()?;
        self.len -= 1;
        self.released.push(id.0);
        Some(source)
    }

    /// Make slots vacated since the last call available again
    pub fn reclaim(&mut self) {
        self.free.append(&mut self.released);
    }

    pub fn get(&self, id: SourceId) -> Option<&T> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut T> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.get(id).is_some()
    }

    /// Ids of all registered sources, in slot order
    pub fn ids(&self) -> Vec<SourceId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| SourceId(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
