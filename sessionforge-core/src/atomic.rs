//! All-or-nothing file writes.
//!
//! Every piece of persisted state goes through [`atomic_write`]: content is
//! written to a sibling temporary file, synced, and renamed over the target.
//! A reader therefore sees either the previous file or the new one, never a
//! partial write, and no file lock is needed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix shared by all temporary files created here.
const TEMP_SUFFIX: &str = "tmp";

/// Atomically replace `path` with `content`.
///
/// The temporary file lives next to the target (same filesystem, so the
/// rename is atomic), is created owner read/write only on Unix, and carries a
/// process-unique suffix so concurrent writers never share one. If any step
/// before the rename completes fails, the temporary file is removed and the
/// error returned; the target keeps its previous contents.
pub fn atomic_write(path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> io::Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path)?;

    let result = write_temp(&temp_path, content.as_ref()).and_then(|()| fs::rename(&temp_path, path));

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %temp_path.display(),
                    "failed to remove temporary file: {}",
                    cleanup
                );
            }
        }
        return Err(e);
    }

    tracing::trace!(path = %path.display(), "atomic write complete");
    Ok(())
}

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        )
    })?;

    let temp_name = format!(
        ".{}.{}-{}.{}",
        file_name.to_string_lossy(),
        std::process::id(),
        uuid::Uuid::new_v4().simple(),
        TEMP_SUFFIX
    );
    Ok(path.with_file_name(temp_name))
}

fn write_temp(temp_path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = open_private(temp_path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}
