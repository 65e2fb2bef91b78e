//! Filesystem collaborator — how the server opens, sizes and reads files.
//!
//! The registry only talks to these traits, so tests can substitute a
//! filesystem that fails or stalls on demand.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fileops_core::FileOpsError;

/// An open, readable file. Reads are positioned and never move a shared cursor.
pub trait OpenFile: Send + Sync + fmt::Debug {
    fn size(&self) -> io::Result<u64>;

    /// Read into `buf` starting at `offset`. May return fewer bytes than
    /// `buf.len()`; 0 means end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

pub trait FileSystem: Send + Sync {
    fn open_for_read(&self, path: &str) -> Result<Arc<dyn OpenFile>, FileOpsError>;
}

/// Local disk, optionally confined to a root directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    root: Option<PathBuf>,
}

impl LocalFileSystem {
    /// Serve any path the process can open.
    pub fn unconfined() -> Self {
        Self { root: None }
    }

    /// Serve only paths under `root`. Absolute request paths are taken as
    /// relative to it.
    pub fn confined(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: Some(root.canonicalize()?),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FileOpsError> {
        let Some(root) = &self.root else {
            return Ok(PathBuf::from(path));
        };

        let relative = Path::new(path.trim_start_matches('/'));
        let canonical = root
            .join(relative)
            .canonicalize()
            .map_err(|e| FileOpsError::from_io(path, None, &e))?;

        if canonical.starts_with(root) {
            Ok(canonical)
        } else {
            tracing::warn!(path, resolved = %canonical.display(), "path escapes root directory");
            Err(FileOpsError::PermissionDenied {
                path: path.to_string(),
            })
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn open_for_read(&self, path: &str) -> Result<Arc<dyn OpenFile>, FileOpsError> {
        let resolved = self.resolve(path)?;
        let file = File::open(&resolved).map_err(|e| FileOpsError::from_io(path, None, &e))?;
        if file
            .metadata()
            .map_err(|e| FileOpsError::from_io(path, None, &e))?
            .is_dir()
        {
            return Err(FileOpsError::Io {
                path: path.to_string(),
                offset: None,
                message: "is a directory".into(),
            });
        }
        Ok(Arc::new(LocalFile { file }))
    }
}

#[derive(Debug)]
struct LocalFile {
    file: File,
}

impl OpenFile for LocalFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }
}
