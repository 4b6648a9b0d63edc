//! Tar-backed prefix source: a single archive whose members are named the
//! same way a directory-backed store would lay out its files
//! (`<a>/<b>/<c>`, per [`PrefixNaming`]).
//!
//! Unlike [`super::DirBackend`], a tar member can't be mapped in isolation,
//! so a lookup means a fresh sequential scan of the archive unless we first
//! remember where each member's payload sits. [`TarBackend::open`] pays for
//! that scan once, recording each member's `(offset, size)` within the
//! file; [`TarBackend::load`] then seeks straight to it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sigfilter_runtime::CoreError;

use super::{MappedBytes, PrefixBackend, PrefixNaming};

struct MemberLocation {
    offset: u64,
    size: u64,
}

pub struct TarBackend {
    archive_path: PathBuf,
    naming: PrefixNaming,
    members: HashMap<String, MemberLocation>,
}

impl TarBackend {
    /// Open `archive_path` and index every member's payload location.
    pub fn open(archive_path: &Path, naming: PrefixNaming) -> Result<Self, CoreError> {
        let file = File::open(archive_path)?;
        let mut archive = tar::Archive::new(file);

        let mut members = HashMap::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let offset = entry.raw_file_position();
            let size = entry.size();
            members.insert(path, MemberLocation { offset, size });
        }

        Ok(Self {
            archive_path: archive_path.to_path_buf(),
            naming,
            members,
        })
    }

    fn member_name(&self, prefix: [u8; 3]) -> String {
        let path = self.naming.relative_path(prefix);
        path.to_string_lossy().replace('\\', "/")
    }
}

impl PrefixBackend for TarBackend {
    fn load(&self, prefix: [u8; 3]) -> Result<Option<Arc<MappedBytes>>, CoreError> {
        let Some(location) = self.members.get(&self.member_name(prefix)) else {
            return Ok(None);
        };

        let mut file = File::open(&self.archive_path)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut buf = vec![0u8; location.size as usize];
        file.read_exact(&mut buf)?;
        Ok(Some(Arc::new(MappedBytes::Owned(buf))))
    }
}
