//! [MODULE B] Posting-list intersection (spec.md §4.B).
//!
//! Candidate-set reduction never needs the full posting list for every
//! n-gram at once: the cheapest lists are read first (same cost-sorted
//! idiom the ambient evaluator uses for pure-text conjunctions) and the
//! per-fid match counter short-circuits once a file can no longer reach
//! `minmatches` even if every remaining list contains it.

use hashbrown::HashMap;
use log::debug;

use crate::ngram::Ngram3;
use crate::primes;
use crate::store::IndexStore;
use sigfilter_runtime::{CoreError, MAX_NGRAMS_PER_QUERY};

/// Read every listed 4-gram's posting list and return the fids appearing
/// in at least `minmatches` of them.
///
/// Lists are read smallest-expected-cost first so the remaining-budget
/// check (`remaining_lists * list.len()`-style reasoning isn't needed
/// here since we don't prune early, matching the original's
/// straight-through accumulation) at least keeps memory low: a single
/// short list read first means most candidates die in the very first
/// counter pass.
pub fn match_posting_lists(
    store: &IndexStore,
    ngrams: &[[u8; 4]],
    minmatches: usize,
) -> Result<Vec<u32>, CoreError> {
    if ngrams.len() > MAX_NGRAMS_PER_QUERY {
        return Err(CoreError::InvalidQuery(format!(
            "query has {} n-grams, exceeds the {} limit",
            ngrams.len(),
            MAX_NGRAMS_PER_QUERY
        )));
    }
    if ngrams.is_empty() || minmatches == 0 {
        return Ok(Vec::new());
    }

    let mut lists = Vec::with_capacity(ngrams.len());
    for &bytes in ngrams {
        let ngram = crate::ngram::Ngram4::from_bytes(bytes);
        lists.push(store.read_posting_list(ngram)?);
    }
    lists.sort_unstable_by_key(|l| l.len());

    if minmatches == lists.len() {
        // Degenerates to a plain merge-intersection across every list,
        // smallest first.
        let mut acc = lists[0].as_slice().to_vec();
        for list in &lists[1..] {
            if acc.is_empty() {
                break;
            }
            acc = intersect_sorted(&acc, list.as_slice());
        }
        return Ok(acc);
    }

    let mut counts: HashMap<u32, u32> = HashMap::new();
    for list in &lists {
        for &fid in list.as_slice() {
            *counts.entry(fid).or_insert(0) += 1;
        }
    }

    let mut out: Vec<u32> = counts
        .into_iter()
        .filter(|&(_, count)| count as usize >= minmatches)
        .map(|(fid, _)| fid)
        .collect();
    out.sort_unstable();
    Ok(out)
}

/// 3-gram fallback: expand each 3-gram to its 256 possible 4-gram
/// completions, union those posting lists, then intersect across
/// 3-grams. Mirrors `malindex.py::get_posting_list_n3`.
pub fn get_posting_list_n3(store: &IndexStore, t3grams: &[Ngram3]) -> Result<Vec<u32>, CoreError> {
    let mut intersection: Option<Vec<u32>> = None;

    for &t3 in t3grams {
        let mut union: Vec<u32> = Vec::new();
        for t4 in t3.expand_to_4grams() {
            let list = store.read_posting_list(t4)?;
            union = union_sorted(&union, list.as_slice());
        }

        intersection = Some(match intersection {
            None => union,
            Some(prev) => intersect_sorted(&prev, &union),
        });

        if intersection.as_ref().is_some_and(|v| v.is_empty()) {
            break;
        }
    }

    Ok(intersection.unwrap_or_default())
}

/// A posting list reduced modulo a groupwidth-specific prime, trading
/// exactness for memory: only `f mod p` is retained, so lookups can
/// produce false positives a caller must re-verify.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedPostingList {
    pub prime: u64,
    pub residues: Vec<u64>,
}

/// The group-set/prefilter algorithm of spec.md §4.B, implementing
/// `malindex.py::get_posting_list(ngrams, groupwidth, tau)` verbatim.
///
/// Every n-gram's posting list is resolved exactly first via
/// `match_posting_lists(store, {ngram}, 1)`; lists no bigger than `tau`
/// are kept as an exact group (reduced mod their prime only for the
/// final join key, not to save memory on a list that's already small),
/// lists bigger than `tau` are folded into a running exact prefilter
/// intersection instead. The group with the fewest residues then drives
/// candidate generation: every residue is tried at `gid, gid+p, gid+2p,
/// ...` while `gid < numsamples`, checked against every other group (and
/// the prefilter, if any) before being accepted.
pub fn match_posting_lists_grouped(
    store: &IndexStore,
    ngrams: &[[u8; 4]],
    groupwidth: u8,
    tau: Option<usize>,
) -> Result<Vec<u32>, CoreError> {
    if ngrams.len() > MAX_NGRAMS_PER_QUERY {
        return Err(CoreError::InvalidQuery(format!(
            "query has {} n-grams, exceeds the {} limit",
            ngrams.len(),
            MAX_NGRAMS_PER_QUERY
        )));
    }

    let mut groups: Vec<(u64, hashbrown::HashSet<u64>)> = Vec::new();
    let mut prefilter: Option<Vec<u32>> = None;

    for &bytes in ngrams {
        let ngram = crate::ngram::Ngram4::from_bytes(bytes);
        let prime = primes::prime_for(groupwidth, ngram.last_byte()).ok_or_else(|| {
            CoreError::InvalidQuery(format!("unsupported groupwidth {groupwidth}"))
        })?;
        let pl = store.read_posting_list(ngram)?;

        if tau.is_none_or(|tau| pl.len() <= tau) {
            let residues: hashbrown::HashSet<u64> =
                pl.as_slice().iter().map(|&f| f as u64 % prime).collect();
            groups.push((prime, residues));
        } else {
            debug!(
                "term with {} postings exceeds tau={:?}, folding into prefilter",
                pl.len(),
                tau
            );
            prefilter = Some(match prefilter {
                None => pl.0,
                Some(prev) => intersect_sorted(&prev, pl.as_slice()),
            });
        }
    }

    if groups.is_empty() {
        return Ok(prefilter.unwrap_or_default());
    }

    let (min_idx, _) = groups
        .iter()
        .enumerate()
        .min_by_key(|(_, (_, residues))| residues.len())
        .expect("groups is non-empty");
    let (min_prime, min_residues) = groups[min_idx].clone();

    let numsamples = store.numsamples() as u64;
    let mut pending: Vec<u64> = min_residues.into_iter().collect();
    let mut accepted: Vec<u32> = Vec::new();

    let mut i = 0;
    while i < pending.len() {
        let gid = pending[i];
        i += 1;

        let passes_prefilter = match &prefilter {
            None => true,
            Some(pf) => pf.binary_search(&(gid as u32)).is_ok(),
        };

        if passes_prefilter {
            let matches_every_other_group = groups.iter().enumerate().all(|(idx, (prime, residues))| {
                idx == min_idx || residues.contains(&(gid % prime))
            });
            if matches_every_other_group {
                accepted.push(gid as u32);
            }
        }

        let next = gid + min_prime;
        if next < numsamples {
            pending.push(next);
        }
    }

    accepted.sort_unstable();
    accepted.dedup();
    Ok(accepted)
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
#[path = "intersect_tests.rs"]
mod tests;
