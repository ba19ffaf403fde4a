use rand::distributions::{Distribution, Uniform};
use rand::thread_rng;

use crate::consts::{HANDLE_ALPHABET, HANDLE_LENGTH};

/// Generates a fresh upload handle: [HANDLE_LENGTH] characters drawn uniformly
/// from lowercase `a`-`z`.
///
/// Handles are not checked for collisions against existing storage.
pub fn generate_handle() -> String {
    let alphabet = Uniform::from(0..HANDLE_ALPHABET.len());

    alphabet
        .sample_iter(thread_rng())
        .take(HANDLE_LENGTH)
        .map(|i| char::from(HANDLE_ALPHABET[i]))
        .collect()
}
