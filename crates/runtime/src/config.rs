pub const PROGRAM_NAME: &str = "sigfilter";
pub const PROGRAM_LOG_LEVEL: &str = "SIGFILTER_LOG_LEVEL";

/// n-gram width. Only 3 and 4 are supported; see [`is_supported_ngram_width`].
pub const DEFAULT_NGRAM_WIDTH: u8 = 4;

/// Wall-clock budget for a single `evaluate_rule` call, in seconds.
pub const DEFAULT_EVAL_TIMEOUT_SECS: u64 = 240;

/// Largest n-gram set a single intersection call accepts.
pub const MAX_NGRAMS_PER_QUERY: usize = 1 << 16;

/// Smallest and largest supported modular-group width.
pub const MIN_GROUPWIDTH: u8 = 11;
pub const MAX_GROUPWIDTH: u8 = 22;

/// Number of primes kept per group width (one per possible last n-gram byte).
pub const PRIMES_PER_WIDTH: usize = 256;

#[inline]
pub const fn is_supported_ngram_width(w: u8) -> bool {
    w == 3 || w == 4
}

#[inline]
pub const fn is_supported_groupwidth(w: u8) -> bool {
    w >= MIN_GROUPWIDTH && w <= MAX_GROUPWIDTH
}

/// Read an evaluation timeout override from the environment, falling back
/// to [`DEFAULT_EVAL_TIMEOUT_SECS`].
pub fn eval_timeout_secs() -> u64 {
    std::env::var("SIGFILTER_EVAL_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_EVAL_TIMEOUT_SECS)
}
