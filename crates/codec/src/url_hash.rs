//! The 64-bit URL hash used as the cache key throughout the coordinator.

/// Folds the bytes of `url` into a 64-bit key: `h = h*31 + (b - 32)`,
/// wrapping on overflow. `url` is assumed to be printable ASCII.
pub fn hash_url(url: &str) -> u64 {
    let mut h: u64 = 0;
    for b in url.bytes() {
        h = h
            .wrapping_mul(31)
            .wrapping_add((b as u64).wrapping_sub(32));
    }
    h
}
