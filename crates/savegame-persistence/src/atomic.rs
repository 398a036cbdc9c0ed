//! Crash-safe file primitives.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, StorageError};

/// Writes data to a file atomically.
///
/// The data goes to a temporary file in the target directory, is synced,
/// and is then renamed over the target, so readers see either the old
/// contents or the new ones.
///
/// # Errors
/// Returns an error if the directory, write, sync or rename fails. On
/// error the previous file contents are untouched.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| StorageError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let write_err = |source| StorageError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    // Same directory so the rename never crosses filesystems
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp_file.write_all(data).map_err(write_err)?;
    temp_file.as_file().sync_all().map_err(write_err)?;
    temp_file
        .persist(path)
        .map_err(|e| write_err(e.error))?;

    Ok(())
}

/// Writes JSON data to a file atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

/// Reads a whole file.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| StorageError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and deserializes JSON, returning `None` if the file doesn't exist.
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = read_bytes(path)?;
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Recursively copies a directory's regular files.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|source| StorageError::DirectoryError {
        path: dst.to_path_buf(),
        source,
    })?;

    let entries = fs::read_dir(src).map_err(|source| StorageError::ReadError {
        path: src.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| StorageError::ReadError {
            path: src.to_path_buf(),
            source,
        })?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|source| StorageError::WriteError { path: to, source })?;
        }
    }
    Ok(())
}
