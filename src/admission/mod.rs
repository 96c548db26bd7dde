// Admission module - GATEKEEPER
// Decides whether a presence sighting may turn into a connection attempt

mod controller;

pub use controller::{Admission, AdmissionController, AdmissionError, DEFAULT_MAX_PEERS};
