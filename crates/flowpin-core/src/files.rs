// Crash-safe file replacement
//
// Contents go to a temporary file next to the destination, are synced,
// then renamed over it. A reader sees either the old file or the new one,
// never a partial write.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{trace, warn};

use crate::error::CoreError;

/// Replace `path` with `contents` atomically.
///
/// The new file gets the destination's permissions with the owner write
/// bit set. A read-only destination is only made writable right before the
/// rename, and its permissions are put back if the rename fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let original = match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(CoreError::io(path, e)),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CoreError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| CoreError::io(tmp.path(), e))?;
    if let Some(ref perms) = original {
        tmp.as_file()
            .set_permissions(writable(perms.clone()))
            .map_err(|e| CoreError::io(tmp.path(), e))?;
    }

    // Windows refuses to rename over a read-only file.
    let read_only = original.filter(Permissions::readonly);
    if let Some(ref perms) = read_only {
        fs::set_permissions(path, writable(perms.clone())).map_err(|e| CoreError::io(path, e))?;
    }

    if let Err(e) = tmp.persist(path) {
        if let Some(Err(restore)) = read_only.map(|perms| fs::set_permissions(path, perms)) {
            warn!(path = %path.display(), error = %restore, "could not restore permissions");
        }
        return Err(CoreError::io(path, e.error));
    }
    trace!(path = %path.display(), bytes = contents.len(), "file replaced");
    Ok(())
}

#[cfg(unix)]
fn writable(perms: Permissions) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode(perms.mode() | 0o200)
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn writable(mut perms: Permissions) -> Permissions {
    perms.set_readonly(false);
    perms
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn overwrites_read_only_file_completely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.boot");
        fs::write(&path, "a much longer original body").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        write_atomic(&path, b"short").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "short");
        assert!(!fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[test]
    fn failed_replace_keeps_destination_read_only() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by a file, so the rename fails.
        let path = dir.path().join("config.boot");
        fs::create_dir(&path).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let err = write_atomic(&path, b"new body").unwrap_err();

        assert!(matches!(err, CoreError::Io { .. }), "got {err:?}");
        assert!(fs::metadata(&path).unwrap().permissions().readonly());
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn leaves_no_temporary_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
