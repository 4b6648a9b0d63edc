use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use memmap2::Mmap;
use sigfilter_runtime::CoreError;

use super::{MappedBytes, PrefixBackend, PrefixNaming};

/// Directory-backed prefix file source: one file per 3-byte prefix at
/// `indexdir/<a>/<b>/<c>` (spec.md §3).
pub struct DirBackend {
    indexdir: PathBuf,
    naming: PrefixNaming,
}

impl DirBackend {
    pub fn new(indexdir: PathBuf, naming: PrefixNaming) -> Self {
        Self { indexdir, naming }
    }
}

impl PrefixBackend for DirBackend {
    fn load(&self, prefix: [u8; 3]) -> Result<Option<Arc<MappedBytes>>, CoreError> {
        let path = self.indexdir.join(self.naming.relative_path(prefix));

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CoreError::Io(err)),
        };

        // SAFETY: the index directory is documented as read-only for the
        // lifetime of a query (spec.md §5); we never write through this
        // mapping.
        let mmap = unsafe { Mmap::map(&file) }.map_err(CoreError::Io)?;
        Ok(Some(Arc::new(MappedBytes::Mmap(mmap))))
    }
}
