//! Token fingerprints.
//!
//! A token is never stored on disk. Instead two independent polynomial
//! rolling hashes stand in for it: [`hash`] picks the home slot in a
//! dictionary table and [`checksum`] tells apart tokens sharing a probe chain.
//! Both are pure functions of the token bytes, so every segment of a run
//! agrees on them and the merger can compare checksums without ever seeing
//! the tokens again.
//!
//! Two tokens with equal `(hash, checksum)` cannot be told apart and will be
//! merged into one postings list. That risk is accepted; it is kept low by the
//! choice of [`CHECKSUM_MODULUS`].

/// Multiplier of the slot hash.
pub const HASH_MULTIPLIER: i64 = 137;

/// Multiplier of the checksum.
pub const CHECKSUM_MULTIPLIER: i64 = 97;

/// Modulus of the checksum (largest prime below 10^6).
pub const CHECKSUM_MODULUS: u64 = 999_979;

fn rolling(token: &[u8], multiplier: i64) -> i64 {
    token.iter().fold(0i64, |h, &b| {
        h.wrapping_mul(multiplier).wrapping_add(i64::from(b))
    })
}

/// Home slot of `token` in a table of `table_size` slots.
///
/// # Panics
///
/// Panics if `table_size` is zero; [`crate::config::IndexConfig::validate`]
/// rejects such tables before any segment exists.
pub fn hash(token: &[u8], table_size: u64) -> u64 {
    rolling(token, HASH_MULTIPLIER).unsigned_abs() % table_size
}

/// Collision disambiguator stored in each dictionary slot.
pub fn checksum(token: &[u8]) -> i64 {
    (rolling(token, CHECKSUM_MULTIPLIER).unsigned_abs() % CHECKSUM_MODULUS) as i64
}
