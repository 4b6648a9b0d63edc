//! Candidate-set reduction for pattern-matching rules over binary files,
//! backed by an on-disk n-gram inverted index.
//!
//! See the per-module docs in [`store`] (index I/O), [`ngram`]
//! (n-gram extraction), [`vlq`] (posting-list delta codec), and
//! [`primes`] (modular-group primes) for the building blocks; [`formula`]
//! and [`simplify`] translate a rule's condition down to byte strings,
//! and [`evaluate`] ties all of the above together into a candidate fid
//! set for a whole rule.

pub mod dfa;
pub mod evaluate;
pub mod fixedstrings;
pub mod formula;
pub mod hex;
pub mod intersect;
pub mod merged;
pub mod ngram;
pub mod primes;
pub mod simplify;
pub mod store;
pub mod vlq;

pub use evaluate::{CandidateSource, evaluate_rule};
pub use formula::{BoolExpr, ConditionNode, NodeKind, Rule, RuleString, YaraString, build_formula, to_cnf, to_dnf};
pub use simplify::{SimplifiedExpr, simplify_expression};
pub use store::{IndexStore, MappedBytes, PathList, PostingList, PrefixBackend, PrefixNaming};
