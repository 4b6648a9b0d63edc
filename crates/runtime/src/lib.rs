mod config;
pub mod error;
pub mod logging;

pub use config::{
    DEFAULT_EVAL_TIMEOUT_SECS, DEFAULT_NGRAM_WIDTH, MAX_GROUPWIDTH, MAX_NGRAMS_PER_QUERY,
    MIN_GROUPWIDTH, PRIMES_PER_WIDTH, eval_timeout_secs, is_supported_groupwidth,
    is_supported_ngram_width,
};
pub use error::{CoreError, CoreResult};
pub use logging::init;
