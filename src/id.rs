//! Random identifiers for requests, devices, and broadcast origins.

// crates.io
use rand::{Rng, distr::Alphanumeric};

/// Length of generated request identifiers.
pub const REQUEST_ID_LEN: usize = 21;
/// Length of generated device identifiers.
pub const DEVICE_ID_LEN: usize = 21;

/// Returns a random alphanumeric string of `len` characters.
pub fn random_id(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
