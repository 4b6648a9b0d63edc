//! [MODULE G] Rule evaluator (spec.md §4.G): the glue between the
//! formula translator (E), the sub-expression simplifier (F), and the
//! posting-list intersector (B/C).
//!
//! [`evaluate_rule`] walks a rule's condition once (via [`build_formula`]),
//! resolves every symbol to a concrete fid set or `None` ("no usable
//! filter"), then recombines per whichever of CNF/DNF has fewer total
//! clause literals. A symbol that appears negated anywhere in the CNF is
//! forced to `None` up front — per spec.md §9, a negation can never
//! tighten a superset filter, so it contributes nothing regardless of
//! what the simplifier would otherwise resolve it to.

use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use log::debug;

use crate::dfa::RegexToDfa;
use crate::formula::{Literal, Rule, build_formula, to_cnf, to_dnf};
use crate::intersect::{get_posting_list_n3, match_posting_lists, match_posting_lists_grouped};
use crate::merged::MergedIndex;
use crate::ngram::{Ngram3, ngrams3_of, ngrams4_of};
use crate::simplify::simplify_expression;
use crate::store::IndexStore;
use sigfilter_runtime::CoreError;

/// Whatever `evaluate_rule` queries against: a single [`IndexStore`] or a
/// [`MergedIndex`] fanning the same query out across shards (spec.md
/// §4.G's `store_or_merged`). Every method here already applies
/// `minmatches = ngrams.len()` (a full AND across the given set) since
/// that is the only shape the evaluator ever needs — per-group vote
/// counting happens at the fid level in [`resolve_symbol`], not inside
/// the intersector.
pub trait CandidateSource {
    fn match_exact(&self, ngrams: &[[u8; 4]]) -> Result<Vec<u32>, CoreError>;
    fn match_grouped(
        &self,
        ngrams: &[[u8; 4]],
        groupwidth: u8,
        tau: Option<usize>,
    ) -> Result<Vec<u32>, CoreError>;
    fn match_n3(&self, t3grams: &[[u8; 3]]) -> Result<Vec<u32>, CoreError>;
}

impl CandidateSource for IndexStore {
    fn match_exact(&self, ngrams: &[[u8; 4]]) -> Result<Vec<u32>, CoreError> {
        match_posting_lists(self, ngrams, ngrams.len())
    }

    fn match_grouped(
        &self,
        ngrams: &[[u8; 4]],
        groupwidth: u8,
        tau: Option<usize>,
    ) -> Result<Vec<u32>, CoreError> {
        match_posting_lists_grouped(self, ngrams, groupwidth, tau)
    }

    fn match_n3(&self, t3grams: &[[u8; 3]]) -> Result<Vec<u32>, CoreError> {
        let t3grams: Vec<Ngram3> = t3grams.iter().map(|&b| Ngram3::from_bytes(b)).collect();
        get_posting_list_n3(self, &t3grams)
    }
}

impl CandidateSource for MergedIndex {
    fn match_exact(&self, ngrams: &[[u8; 4]]) -> Result<Vec<u32>, CoreError> {
        self.query(ngrams, None, None)
    }

    fn match_grouped(
        &self,
        ngrams: &[[u8; 4]],
        groupwidth: u8,
        tau: Option<usize>,
    ) -> Result<Vec<u32>, CoreError> {
        self.query(ngrams, Some(groupwidth), tau)
    }

    fn match_n3(&self, t3grams: &[[u8; 3]]) -> Result<Vec<u32>, CoreError> {
        self.query_n3(t3grams)
    }
}

/// Evaluate `rule` against `source`, returning a candidate fid set or
/// `None` ("no usable filter, caller must verify the whole corpus") or a
/// propagated error (spec.md §4.G, §7).
///
/// `lowerbound` is the n-gram width the underlying store indexes by (3
/// or 4; guarded by a debug assertion, matching the original's
/// `assert lowerbound in (3, 4)`). `groupwidth`/`tau` opt into the
/// modular-group variant of module B wherever a 4-gram posting list is
/// read. `timeout` is the per-rule wall-clock budget (spec.md §4.G,
/// default 240s — see [`sigfilter_runtime::DEFAULT_EVAL_TIMEOUT_SECS`]);
/// it is checked at symbol boundaries, never preempting a read in
/// progress.
pub fn evaluate_rule(
    source: &dyn CandidateSource,
    rule: &dyn Rule,
    resolver: &dyn RegexToDfa,
    lowerbound: u8,
    groupwidth: Option<u8>,
    tau: Option<usize>,
    timeout: Duration,
) -> Result<Option<Vec<u32>>, CoreError> {
    debug_assert!(
        lowerbound == 3 || lowerbound == 4,
        "lowerbound must be 3 or 4"
    );
    let start = Instant::now();

    let (expr, symmap) = build_formula(rule.condition())?;
    let cnf = to_cnf(&expr);
    let dnf = to_dnf(&expr);

    // spec.md §9: a symbol negated anywhere contributes no filter at all,
    // even where it appears unnegated elsewhere in the same formula.
    let mut negated_symbols: HashSet<usize> = HashSet::new();
    for clause in &cnf {
        for lit in clause {
            if lit.negated {
                negated_symbols.insert(lit.symbol);
            }
        }
    }

    let mut cache: HashMap<(bool, Vec<Vec<u8>>), Vec<u32>> = HashMap::new();
    let mut symbol_results: Vec<Option<Vec<u32>>> = Vec::with_capacity(symmap.len());
    for i in 0..symmap.len() {
        if start.elapsed() > timeout {
            return Err(CoreError::Timeout);
        }
        if negated_symbols.contains(&i) {
            symbol_results.push(None);
            continue;
        }
        let node = symmap.node(i);
        let result = resolve_symbol(source, rule, node, resolver, lowerbound, groupwidth, tau, &mut cache)?;
        symbol_results.push(result);
    }

    if start.elapsed() > timeout {
        return Err(CoreError::Timeout);
    }

    let cnf_len: usize = cnf.iter().map(Vec::len).sum();
    let dnf_len: usize = dnf.iter().map(Vec::len).sum();

    // Strict `<`: a tie keeps the engine's natural CNF preference (spec.md
    // §4.G — the original computes `dnflen < cnflen` and falls through to
    // CNF otherwise).
    if dnf_len < cnf_len {
        Ok(combine_dnf(&dnf, &symbol_results))
    } else {
        Ok(combine_cnf(&cnf, &symbol_results))
    }
}

fn literal_result<'a>(lit: &Literal, symbol_results: &'a [Option<Vec<u32>>]) -> Option<&'a Vec<u32>> {
    symbol_results[lit.symbol].as_ref()
}

/// `result = union over clauses of (intersection over literals in clause
/// of symbol results)`. A literal lacking a concrete result is "universe"
/// within its clause's intersection and is simply skipped; only a clause
/// in which *every* literal lacks a concrete result never becomes
/// concrete at all, and that makes the entire DNF — hence the rule —
/// unfilterable (spec.md §4.G; `malindex.py::evaluate_rule`'s `curr is
/// None` case).
fn combine_dnf(dnf: &[Vec<Literal>], symbol_results: &[Option<Vec<u32>>]) -> Option<Vec<u32>> {
    let mut union_acc: Vec<u32> = Vec::new();
    for clause in dnf {
        let mut clause_result: Option<Vec<u32>> = None;
        for lit in clause {
            if let Some(lit_result) = literal_result(lit, symbol_results) {
                clause_result = Some(match clause_result {
                    None => lit_result.clone(),
                    Some(prev) => intersect_sorted(&prev, lit_result),
                });
            }
        }
        union_acc = union_sorted(&union_acc, &clause_result?);
    }
    Some(union_acc)
}

/// `result = intersection over clauses of (union over literals in clause
/// of symbol results)`. A clause containing a literal with no concrete
/// result is itself "universe" and contributes no constraint — it is
/// dropped from the intersection rather than voiding the whole rule
/// (spec.md §4.G).
fn combine_cnf(cnf: &[Vec<Literal>], symbol_results: &[Option<Vec<u32>>]) -> Option<Vec<u32>> {
    let mut kept: Vec<Vec<u32>> = Vec::new();
    for clause in cnf {
        let mut clause_union: Option<Vec<u32>> = Some(Vec::new());
        for lit in clause {
            match literal_result(lit, symbol_results) {
                None => {
                    clause_union = None;
                    break;
                }
                Some(v) => {
                    clause_union = clause_union.map(|prev| union_sorted(&prev, v));
                }
            }
        }
        if let Some(u) = clause_union {
            kept.push(u);
        }
    }

    let mut iter = kept.into_iter();
    let mut acc = iter.next()?;
    for clause_result in iter {
        acc = intersect_sorted(&acc, &clause_result);
    }
    Some(acc)
}

/// Resolve one symbol's condition node to a concrete fid set, or `None`
/// if the simplifier found nothing to filter on (spec.md §4.F/§4.G).
#[allow(clippy::too_many_arguments)]
fn resolve_symbol(
    source: &dyn CandidateSource,
    rule: &dyn Rule,
    node: &dyn crate::formula::ConditionNode,
    resolver: &dyn RegexToDfa,
    lowerbound: u8,
    groupwidth: Option<u8>,
    tau: Option<usize>,
    cache: &mut HashMap<(bool, Vec<Vec<u8>>), Vec<u32>>,
) -> Result<Option<Vec<u32>>, CoreError> {
    let simplified = simplify_expression(rule, node, resolver, lowerbound as usize)?;
    if simplified.required == 0 || simplified.groups.is_empty() {
        return Ok(None);
    }

    let mut counts: HashMap<u32, u32> = HashMap::new();
    for (group, &nocase) in simplified.groups.iter().zip(&simplified.nocase) {
        let mut key = group.clone();
        key.sort();
        let cache_key = (nocase, key);

        let fids = match cache.get(&cache_key) {
            Some(cached) => cached.clone(),
            None => {
                debug!("cache miss for alternative group of {} string(s), nocase={nocase}", group.len());
                let computed = resolve_group(source, group, nocase, lowerbound, groupwidth, tau)?;
                cache.insert(cache_key, computed.clone());
                computed
            }
        };

        for fid in fids {
            *counts.entry(fid).or_insert(0) += 1;
        }
    }

    let mut out: Vec<u32> = counts
        .into_iter()
        .filter(|&(_, count)| count as usize >= simplified.required)
        .map(|(fid, _)| fid)
        .collect();
    out.sort_unstable();
    Ok(Some(out))
}

fn resolve_group(
    source: &dyn CandidateSource,
    group: &[Vec<u8>],
    nocase: bool,
    lowerbound: u8,
    groupwidth: Option<u8>,
    tau: Option<usize>,
) -> Result<Vec<u32>, CoreError> {
    if group.is_empty() {
        return Ok(Vec::new());
    }
    if nocase {
        resolve_nocase_group(source, group, lowerbound, groupwidth, tau)
    } else {
        resolve_case_sensitive_group(source, group, lowerbound, groupwidth, tau)
    }
}

/// Case-sensitive group: intersect across every string's own posting
/// list (each string's own list already requires all of its n-grams).
fn resolve_case_sensitive_group(
    source: &dyn CandidateSource,
    group: &[Vec<u8>],
    lowerbound: u8,
    groupwidth: Option<u8>,
    tau: Option<usize>,
) -> Result<Vec<u32>, CoreError> {
    let mut acc: Option<Vec<u32>> = None;
    for s in group {
        let pl = string_posting_list(source, s, lowerbound, groupwidth, tau)?;
        acc = Some(match acc {
            None => pl,
            Some(prev) => intersect_sorted(&prev, &pl),
        });
        if acc.as_ref().is_some_and(Vec::is_empty) {
            break;
        }
    }
    Ok(acc.unwrap_or_default())
}

/// One string's own posting list: every one of its n-grams must be
/// present (a full AND across its n-gram set).
fn string_posting_list(
    source: &dyn CandidateSource,
    s: &[u8],
    lowerbound: u8,
    groupwidth: Option<u8>,
    tau: Option<usize>,
) -> Result<Vec<u32>, CoreError> {
    match lowerbound {
        4 => {
            let ngrams: Vec<[u8; 4]> = ngrams4_of(s).iter().map(|n| n.to_bytes()).collect();
            if ngrams.is_empty() {
                return Ok(Vec::new());
            }
            match groupwidth {
                Some(gw) => source.match_grouped(&ngrams, gw, tau),
                None => source.match_exact(&ngrams),
            }
        }
        3 => {
            let ngrams: Vec<[u8; 3]> = ngrams3_of(s).iter().map(|n| n.to_bytes()).collect();
            if ngrams.is_empty() {
                return Ok(Vec::new());
            }
            source.match_n3(&ngrams)
        }
        _ => unreachable!("lowerbound guarded to 3 or 4"),
    }
}

/// Case-insensitive group: the longest string, lowercased, every one of
/// its length-`lowerbound` n-grams expanded to all `2^lowerbound` per-byte
/// case variants, unioned across variants and n-grams (spec.md §4.G).
fn resolve_nocase_group(
    source: &dyn CandidateSource,
    group: &[Vec<u8>],
    lowerbound: u8,
    groupwidth: Option<u8>,
    tau: Option<usize>,
) -> Result<Vec<u32>, CoreError> {
    let longest = group
        .iter()
        .max_by_key(|s| s.len())
        .expect("group is non-empty");
    let lower = longest.to_ascii_lowercase();
    let w = lowerbound as usize;
    if lower.len() < w {
        return Ok(Vec::new());
    }

    let mut result: Vec<u32> = Vec::new();
    for window in lower.windows(w) {
        for variant in case_variants(window) {
            let pl = match w {
                4 => {
                    let ngram = [variant[0], variant[1], variant[2], variant[3]];
                    match groupwidth {
                        Some(gw) => source.match_grouped(&[ngram], gw, tau)?,
                        None => source.match_exact(&[ngram])?,
                    }
                }
                3 => {
                    let ngram = [variant[0], variant[1], variant[2]];
                    source.match_n3(&[ngram])?
                }
                _ => unreachable!("lowerbound guarded to 3 or 4"),
            };
            result = union_sorted(&result, &pl);
        }
    }
    Ok(result)
}

/// Enumerate every per-byte case variant of a lowercase n-gram: bit `i`
/// of the variant index selects whether byte `i` is altered (`- 0x20`,
/// unless it's `0x00`) or left as-is (spec.md §4.G, §9).
fn case_variants(ngram_lower: &[u8]) -> Vec<Vec<u8>> {
    let w = ngram_lower.len();
    let mut variants = Vec::with_capacity(1 << w);
    for mask in 0..(1usize << w) {
        let mut v = Vec::with_capacity(w);
        for (i, &b) in ngram_lower.iter().enumerate() {
            if (mask >> i) & 1 == 1 && b != 0 {
                v.push(b - 0x20);
            } else {
                v.push(b);
            }
        }
        variants.push(v);
    }
    variants.sort();
    variants.dedup();
    variants
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn union_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
#[path = "evaluate_tests.rs"]
mod tests;
