//! Share-key generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::KEY_LENGTH;

/// Returns a fresh share key: [`KEY_LENGTH`] characters drawn uniformly
/// and independently from `[A-Za-z0-9]`.
///
/// Uniqueness is not checked against the store; at 62^8 possible keys a
/// collision over the expected store size is ignored.
#[must_use]
pub fn generate() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}
