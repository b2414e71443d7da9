//! Component C: a pure, deterministic 32-bit hash used by `fractional` to
//! assign a bucketing key to a stable position in `[0, 1)`.
//!
//! Grounded on the teacher's `targeting/fractional.rs`, which calls
//! `murmurhash3::murmurhash3_x86_32` with a fixed seed of 0. Kept as its
//! own module (rather than inlined into the `fractional` operator) because
//! §4.2 calls it out as a standalone component with its own stability
//! contract: re-implementations must stay bit-compatible.

use murmurhash3::murmurhash3_x86_32;

const SEED: u32 = 0;

/// Hashes `key`'s UTF-8 bytes and returns the result as a fraction of
/// `u32::MAX`, in `[0, 1)`.
pub fn bucket_position(key: &str) -> f64 {
    let hash = murmurhash3_x86_32(key.as_bytes(), SEED);
    hash as f64 / (u32::MAX as f64 + 1.0)
}
