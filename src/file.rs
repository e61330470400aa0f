//! Source and destination file handling.
//!
//! Reads are a single `fs::read`. Writes go through a tempfile in the
//! destination directory followed by fsync and rename, so the destination
//! either keeps its old bytes or gets all of the new ones.

use crate::document::Document;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("cannot read source {path}: {source}")]
    SourceNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("source {path} is not valid UTF-8 (first bad byte at {valid_up_to})")]
    NotUtf8 { path: PathBuf, valid_up_to: usize },

    #[error("cannot write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write backup {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FileError {
    pub fn path(&self) -> &Path {
        match self {
            FileError::SourceNotFound { path, .. }
            | FileError::NotUtf8 { path, .. }
            | FileError::WriteFailed { path, .. }
            | FileError::BackupFailed { path, .. } => path,
        }
    }
}

/// Load `path` as a UTF-8 document.
pub fn read_document(path: &Path) -> Result<Document, FileError> {
    let bytes = fs::read(path).map_err(|source| FileError::SourceNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    Document::from_utf8(bytes).map_err(|e| FileError::NotUtf8 {
        path: path.to_path_buf(),
        valid_up_to: e.utf8_error().valid_up_to(),
    })
}

/// Atomic file write: tempfile + fsync + rename.
///
/// An existing destination keeps its permissions.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), FileError> {
    let fail = |source: std::io::Error| FileError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    // Same directory keeps the rename on one filesystem.
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(fail)?;
    temp.write_all(content).map_err(fail)?;
    temp.as_file().sync_all().map_err(fail)?;

    if let Ok(meta) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(meta.permissions())
            .map_err(fail)?;
    }

    temp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// `<path>.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

/// Copy `path` to `<path>.backup`, carrying over the original mtime.
pub fn write_backup(path: &Path) -> Result<PathBuf, FileError> {
    let backup = backup_path(path);
    let fail = |source: std::io::Error| FileError::BackupFailed {
        path: backup.clone(),
        source,
    };

    let meta = fs::metadata(path).map_err(fail)?;
    fs::copy(path, &backup).map_err(fail)?;

    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(&backup, mtime).map_err(fail)?;

    Ok(backup)
}
