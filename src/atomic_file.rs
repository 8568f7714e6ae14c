//! Crash-safe file replacement shared by the registry and config writers.
//!
//! Data lands in a hidden sibling temp file, is fsynced, moved onto the
//! target and the parent directory is synced. Readers see either the old
//! file or the complete new one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::TryRngCore;

const CREATE_ATTEMPTS: usize = 5;

/// Atomically write `data` to `path`, replacing any previous file.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let (dir, tmp_path) = write_temp(path, data)?;
    if let Err(err) = replace_file(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    sync_parent_dir(dir)
}

/// Atomically publish `data` at `path`, failing with
/// [`io::ErrorKind::AlreadyExists`] if `path` exists.
///
/// The complete temp file is hard-linked into place, so concurrent writers
/// of the same path cannot replace each other: exactly one link succeeds.
pub fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    let (dir, tmp_path) = write_temp(path, data)?;
    let linked = std::fs::hard_link(&tmp_path, path);
    let _ = std::fs::remove_file(&tmp_path);
    linked?;
    sync_parent_dir(dir)
}

/// Write and fsync `data` into a fresh hidden sibling of `path`.
fn write_temp<'a>(path: &'a Path, data: &[u8]) -> io::Result<(&'a Path, PathBuf)> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("target path has no parent directory"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target path has no file name"))?;

    let mut last_err = None;
    for _ in 0..CREATE_ATTEMPTS {
        let tmp_path = temp_path(dir, &file_name.to_string_lossy())?;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path);
        let mut file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                last_err = Some(err);
                continue;
            }
            Err(err) => return Err(err),
        };

        let written = file.write_all(data).and_then(|()| file.sync_all());
        drop(file);
        if let Err(err) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
        return Ok((dir, tmp_path));
    }

    // Not `AlreadyExists`: that kind is reserved for an existing target.
    Err(io::Error::other(format!(
        "failed to create temporary file for {}: {}",
        path.display(),
        last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown error".into())
    )))
}

/// Whether `name` is a temp file left behind by [`write_atomic`].
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(".tmp-")
}

fn temp_path(dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let mut bytes = [0u8; 6];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| io::Error::other(format!("failed to generate temp suffix: {err}")))?;
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Ok(dir.join(format!(".{file_name}.tmp-{suffix}")))
}

fn replace_file(temp_path: &Path, path: &Path) -> io::Result<()> {
    match std::fs::rename(temp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            #[cfg(target_os = "windows")]
            if err.kind() == io::ErrorKind::AlreadyExists
                || err.kind() == io::ErrorKind::PermissionDenied
            {
                if let Err(inner) = std::fs::remove_file(path) {
                    if inner.kind() != io::ErrorKind::NotFound {
                        return Err(inner);
                    }
                }
                return std::fs::rename(temp_path, path);
            }
            Err(err)
        }
    }
}

fn sync_parent_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
