//! [MODULE A] On-disk n-gram index store (spec.md §3, §4.A).
//!
//! The store is read-only for the lifetime of a query; callers open it
//! once per evaluation and share it across symbols via `&IndexStore`.

mod dir_backend;
mod path_list;
mod tar_backend;

pub use dir_backend::DirBackend;
pub use path_list::PathList;
pub use tar_backend::TarBackend;

use std::path::Path;
use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use sigfilter_runtime::CoreError;

use crate::ngram::Ngram4;
use crate::vlq;

/// Offset header slot value meaning "this 4-gram has an empty posting list".
const EMPTY_SENTINEL: u64 = 0xFFFF_FFFF_FFFF_FFFF;
/// Size of the 256-entry offset header, in bytes.
pub(crate) const HEADER_BYTES: usize = 256 * 8;

/// How the builder stringified each prefix byte into a path segment.
///
/// Spec.md §9 flags this as an index-format parameter the reader must be
/// told, not guess: `malindex.py`'s own `get_file_path` stringifies each
/// byte in decimal (`str(byte)`), while `merge.py`'s target layout uses
/// two-digit lowercase hex. Real on-disk indices may use either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixNaming {
    Decimal,
    Hex,
}

impl PrefixNaming {
    pub fn segment(self, byte: u8) -> String {
        match self {
            PrefixNaming::Decimal => byte.to_string(),
            PrefixNaming::Hex => format!("{byte:02x}"),
        }
    }

    pub fn relative_path(self, prefix: [u8; 3]) -> std::path::PathBuf {
        [
            self.segment(prefix[0]),
            self.segment(prefix[1]),
            self.segment(prefix[2]),
        ]
        .iter()
        .collect()
    }
}

/// A decoded posting list: sorted ascending, deduplicated file ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList(pub Vec<u32>);

impl PostingList {
    pub fn empty() -> Self {
        PostingList(Vec::new())
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bytes backing a loaded prefix file, zero-copy when the backend can
/// manage it (a directory-backed mmap) and owned otherwise (a slice
/// extracted from a tar archive).
pub enum MappedBytes {
    Mmap(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl std::ops::Deref for MappedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            MappedBytes::Mmap(m) => m,
            MappedBytes::Owned(v) => v,
        }
    }
}

/// Backend abstraction over the two physical layouts spec.md §4.A
/// describes: a directory of per-prefix files, or a single packed
/// archive ("tar") containing the same per-prefix files as members.
///
/// The hot-path parsing logic in [`IndexStore::read_posting_list`] is
/// written once against this trait; it never branches on which backend
/// is in use (spec.md §9: "do not branch in hot paths").
pub trait PrefixBackend: Send + Sync {
    /// Return the full bytes of the prefix file for `prefix`, or `None`
    /// if no such file/member exists (not an error — an absent prefix
    /// file means every 4-gram under it has an empty posting list).
    fn load(&self, prefix: [u8; 3]) -> Result<Option<Arc<MappedBytes>>, CoreError>;
}

/// The on-disk n-gram index: a backend plus the sample count needed to
/// bound modular-group enumeration.
pub struct IndexStore {
    backend: Box<dyn PrefixBackend>,
    numsamples: u32,
    /// Per-prefix-file cache, shared across queries issued against this
    /// store. Keyed by prefix; holds the decoded file bytes.
    cache: RwLock<HashMap<[u8; 3], Option<Arc<MappedBytes>>>>,
}

impl IndexStore {
    pub fn new(backend: Box<dyn PrefixBackend>, numsamples: u32) -> Self {
        Self {
            backend,
            numsamples,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Open a directory-backed store rooted at `indexdir`.
    pub fn open_dir(
        indexdir: impl Into<std::path::PathBuf>,
        naming: PrefixNaming,
        numsamples: u32,
    ) -> Self {
        Self::new(Box::new(DirBackend::new(indexdir.into(), naming)), numsamples)
    }

    /// Open a tar-backed store from an archive file.
    pub fn open_tar(
        archive_path: &Path,
        naming: PrefixNaming,
        numsamples: u32,
    ) -> Result<Self, CoreError> {
        let backend = TarBackend::open(archive_path, naming)?;
        Ok(Self::new(Box::new(backend), numsamples))
    }

    pub fn numsamples(&self) -> u32 {
        self.numsamples
    }

    fn prefix_file(&self, prefix: [u8; 3]) -> Result<Option<Arc<MappedBytes>>, CoreError> {
        if let Some(cached) = self.cache.read().unwrap().get(&prefix) {
            return Ok(cached.clone());
        }
        let loaded = self.backend.load(prefix)?;
        self.cache.write().unwrap().insert(prefix, loaded.clone());
        Ok(loaded)
    }

    /// Read the posting list for a single 4-gram (spec.md §4.A).
    pub fn read_posting_list(&self, ngram: Ngram4) -> Result<PostingList, CoreError> {
        let Some(bytes) = self.prefix_file(ngram.prefix())? else {
            return Ok(PostingList::empty());
        };

        if bytes.len() < HEADER_BYTES {
            return Err(CoreError::CorruptIndex(format!(
                "prefix file shorter than header ({} bytes)",
                bytes.len()
            )));
        }

        let slot = ngram.last_byte() as usize;
        let off_bytes = &bytes[slot * 8..slot * 8 + 8];
        let offset = u64::from_le_bytes(off_bytes.try_into().unwrap());

        if offset == EMPTY_SENTINEL {
            return Ok(PostingList::empty());
        }

        let payload_start = HEADER_BYTES
            .checked_add(offset as usize)
            .ok_or_else(|| CoreError::CorruptIndex("posting list offset overflow".to_string()))?;

        if payload_start + 12 > bytes.len() {
            return Err(CoreError::CorruptIndex(
                "posting list header lies outside prefix file".to_string(),
            ));
        }

        let length = u64::from_le_bytes(bytes[payload_start..payload_start + 8].try_into().unwrap());
        if length == 0 {
            return Err(CoreError::CorruptIndex(
                "posting list length is zero for a non-sentinel offset".to_string(),
            ));
        }

        let first_fid = u32::from_le_bytes(
            bytes[payload_start + 8..payload_start + 12]
                .try_into()
                .unwrap(),
        );

        let mut fids = Vec::with_capacity(length as usize);
        fids.push(first_fid);

        if length > 1 {
            let deltas_start = payload_start + 12;
            if deltas_start > bytes.len() {
                return Err(CoreError::CorruptIndex(
                    "posting list deltas lie outside prefix file".to_string(),
                ));
            }
            let deltas = vlq::decode_n(&bytes[deltas_start..], (length - 1) as usize)?;
            let mut curr = first_fid as u64;
            for delta in deltas {
                if delta == 0 {
                    return Err(CoreError::CorruptIndex(
                        "posting list delta is zero (fids must strictly increase)".to_string(),
                    ));
                }
                curr += delta;
                fids.push(curr as u32);
            }
        }

        Ok(PostingList(fids))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
