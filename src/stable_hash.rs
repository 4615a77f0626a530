//! Deterministic hashing of assignment keys.
//!
//! Not cryptographic. The only requirements are stability (same seed + key gives the same
//! value on every platform and every run) and good spread over the unit interval, so that
//! bucketing by cumulative allocation reproduces the configured traffic fractions.

/// Deterministic (non-crypto) stable hash of `key` under `seed`.
///
/// Implementation:
/// - FNV-1a over bytes (cheap, stable across platforms)
/// - SplitMix64 finalizer (improves bit diffusion / uniformity)
#[must_use]
pub fn stable_hash64(seed: u64, key: &str) -> u64 {
    let mut h: u64 = 14695981039346656037u64;
    for b in key.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211u64);
    }
    splitmix64(seed ^ h)
}

/// Map a 64-bit hash to a uniform value in `[0, 1)`.
///
/// Uses the top 53 bits so every output is exactly representable as an `f64`.
#[must_use]
pub fn unit_interval(hash: u64) -> f64 {
    (hash >> 11) as f64 / (1u64 << 53) as f64
}

/// Hash `key` under `seed` straight to a bucket value in `[0, 1)`.
#[must_use]
pub fn key_bucket(seed: u64, key: &str) -> f64 {
    unit_interval(stable_hash64(seed, key))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
