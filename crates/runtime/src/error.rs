use std::fmt;

/// Error kinds surfaced by the index store and the rule evaluator.
///
/// Propagation policy (see spec.md §7): only two situations recover
/// locally instead of propagating — a missing prefix file (treated as an
/// empty posting list by the store, never surfaced here) and an
/// undecidable sub-expression (treated as `required = 0` by the
/// simplifier, never surfaced here). Everything else reaches the caller
/// as one of these variants.
#[derive(Debug)]
pub enum CoreError {
    /// Malformed on-disk index: bad header, impossible offset, a zero
    /// length with a non-sentinel offset, or a truncated VLQ sequence.
    CorruptIndex(String),
    /// Underlying storage failure (open/seek/read).
    Io(std::io::Error),
    /// A condition subtree the simplifier or formula translator cannot
    /// map to a filter. Carries the offending node's text, if available.
    UnsupportedCondition(String),
    /// Per-rule wall-clock budget exceeded.
    Timeout,
    /// Caller supplied an n-gram set larger than the store accepts, or
    /// an unsupported n-gram/group width.
    InvalidQuery(String),
    /// An invariant the evaluator itself is responsible for maintaining
    /// was violated (a bug in this crate, not bad input).
    Internal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::CorruptIndex(msg) => write!(f, "corrupt index: {msg}"),
            CoreError::Io(err) => write!(f, "I/O error: {err}"),
            CoreError::UnsupportedCondition(text) => {
                write!(f, "unsupported condition: {text}")
            }
            CoreError::Timeout => write!(f, "rule evaluation timed out"),
            CoreError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            CoreError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
