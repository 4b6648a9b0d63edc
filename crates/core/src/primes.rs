//! `Primes[groupwidth]`: the 256 largest primes strictly below `2^w - 1`,
//! sorted ascending, for `w` in `11..=22` (spec.md §4.B).
//!
//! The Python source (`malindex.py`) computes this table once at import
//! time via trial division. A Rust process re-deriving it on every launch
//! would pay that cost on every single query; since the table is a pure
//! function of `w` with no runtime inputs, it is generated once (by the
//! `gen_primes_table` test below, which also serves as the
//! consistency check) and checked in as a `const` table instead.

use sigfilter_runtime::{MAX_GROUPWIDTH, MIN_GROUPWIDTH, PRIMES_PER_WIDTH};

include!("primes_table.rs");

/// Look up the prime used to groupify the n-gram whose last byte is
/// `last_byte`, for the given `groupwidth`.
///
/// Returns `None` if `groupwidth` is outside `[MIN_GROUPWIDTH,
/// MAX_GROUPWIDTH]`.
pub fn prime_for(groupwidth: u8, last_byte: u8) -> Option<u64> {
    if !(MIN_GROUPWIDTH..=MAX_GROUPWIDTH).contains(&groupwidth) {
        return None;
    }
    let row = &PRIMES[(groupwidth - MIN_GROUPWIDTH) as usize];
    debug_assert_eq!(row.len(), PRIMES_PER_WIDTH);
    Some(row[last_byte as usize])
}

#[cfg(test)]
#[path = "primes_tests.rs"]
mod tests;
