//! [MODULE C] Merged index: several shards with disjoint fid ranges,
//! queried as if they were one (spec.md §4.C).

use crossbeam::channel;
use log::warn;

use crate::intersect::{get_posting_list_n3, match_posting_lists, match_posting_lists_grouped};
use crate::ngram::Ngram3;
use crate::store::IndexStore;
use sigfilter_runtime::CoreError;

/// A shard plus the offset its fids must be rebased by to land in the
/// merged fid space.
struct Shard {
    offset: u32,
    store: IndexStore,
}

/// Several [`IndexStore`]s stitched into one fid space, each shard
/// holding a disjoint, contiguous range starting at its `offset`.
pub struct MergedIndex {
    shards: Vec<Shard>,
}

impl MergedIndex {
    /// `shards` is `(offset, store)` pairs; offsets need not be sorted,
    /// but ranges must not overlap (not checked here — the caller
    /// assembled them from a single build, same as the original).
    pub fn new(shards: Vec<(u32, IndexStore)>) -> Self {
        Self {
            shards: shards
                .into_iter()
                .map(|(offset, store)| Shard { offset, store })
                .collect(),
        }
    }

    /// Fan `f` out across every shard on its own thread, rebase each
    /// shard's fids by its offset, and union the results.
    ///
    /// Any shard failing is fatal for the whole query: the first error
    /// observed (in shard order) is returned, matching `malindexmerged`'s
    /// behavior of propagating whichever future raised first.
    fn fan_out<F>(&self, f: F) -> Result<Vec<u32>, CoreError>
    where
        F: Fn(&IndexStore) -> Result<Vec<u32>, CoreError> + Sync,
    {
        let (tx, rx) = channel::unbounded::<(usize, Result<Vec<u32>, CoreError>)>();

        crossbeam::scope(|scope| {
            for (idx, shard) in self.shards.iter().enumerate() {
                let tx = tx.clone();
                let f = &f;
                scope.spawn(move |_| {
                    let result =
                        f(&shard.store).map(|fids| fids.into_iter().map(|fid| fid + shard.offset).collect());
                    let _ = tx.send((idx, result));
                });
            }
            drop(tx);

            let mut by_shard: Vec<Option<Result<Vec<u32>, CoreError>>> =
                (0..self.shards.len()).map(|_| None).collect();
            while let Ok((idx, result)) = rx.recv() {
                by_shard[idx] = Some(result);
            }

            let mut merged = Vec::new();
            for (idx, slot) in by_shard.into_iter().enumerate() {
                let fids = slot.expect("every shard index sent exactly one result").inspect_err(|err| {
                    warn!("shard {idx} failed, failing the whole merged query: {err}");
                })?;
                merged = union_sorted(&merged, &fids);
            }
            Ok(merged)
        })
        .expect("shard threads never panic: match_posting_lists_grouped only returns Result")
    }

    /// `groupwidth` selects the modular-group variant the same way a
    /// single-shard query does (spec.md §4.B is opt-in); `None` fans out
    /// the plain exact intersection instead, against every n-gram's
    /// posting list (`minmatches = ngrams.len()`).
    pub fn query(
        &self,
        ngrams: &[[u8; 4]],
        groupwidth: Option<u8>,
        tau: Option<usize>,
    ) -> Result<Vec<u32>, CoreError> {
        self.fan_out(|store| match groupwidth {
            Some(groupwidth) => match_posting_lists_grouped(store, ngrams, groupwidth, tau),
            None => match_posting_lists(store, ngrams, ngrams.len()),
        })
    }

    /// 3-gram fallback (spec.md §4.B) fanned out the same way: each shard
    /// resolves `get_posting_list_n3` independently before rebasing.
    pub fn query_n3(&self, t3grams: &[[u8; 3]]) -> Result<Vec<u32>, CoreError> {
        let t3grams: Vec<Ngram3> = t3grams.iter().map(|&b| Ngram3::from_bytes(b)).collect();
        self.fan_out(|store| get_posting_list_n3(store, &t3grams))
    }
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
#[path = "merged_tests.rs"]
mod tests;
