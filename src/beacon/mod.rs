// Beacon module - DISCOVERY VIEW
// Tracks devices broadcasting presence and expires stale sightings

mod tracker;

pub use tracker::{BeaconEntry, BeaconTracker, BCAST_TIMEOUT_MS, UNKNOWN_NAME};
