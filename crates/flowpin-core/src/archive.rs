// ── Backup archive handling ──
//
// Controller backups are gzip-compressed tarballs. Members are checked
// before anything touches disk: one bad path rejects the whole archive.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use tracing::debug;

use crate::error::CoreError;
use crate::files;

/// Scratch directory for an unpacked backup, removed on drop.
#[derive(Debug)]
pub struct ExtractionDir {
    dir: TempDir,
}

impl ExtractionDir {
    /// Create under `parent`, or the system temp dir when `None`.
    pub fn create(parent: Option<&Path>) -> Result<Self, CoreError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("flowpin-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
                builder.tempdir_in(parent).map_err(|e| CoreError::io(parent, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| CoreError::io(std::env::temp_dir(), e))?,
        };
        debug!(path = %dir.path().display(), "extraction directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn open(archive_path: &Path) -> Result<tar::Archive<GzDecoder<BufReader<File>>>, CoreError> {
    let file = File::open(archive_path).map_err(|e| CoreError::io(archive_path, e))?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Reject absolute paths and any `..` component.
fn check_member(path: &Path) -> Result<(), CoreError> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CoreError::PathTraversal {
            member: path.display().to_string(),
        });
    }
    Ok(())
}

/// Extract a `.tar.gz` into `dest` once every member path has been vetted.
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<(), CoreError> {
    let mut members = 0_usize;
    let mut archive = open(archive_path)?;
    for entry in archive.entries().map_err(|e| CoreError::io(archive_path, e))? {
        let entry = entry.map_err(|e| CoreError::io(archive_path, e))?;
        let path = entry.path().map_err(|e| CoreError::io(archive_path, e))?;
        check_member(&path)?;
        members += 1;
    }

    open(archive_path)?
        .unpack(dest)
        .map_err(|e| CoreError::io(archive_path, e))?;
    debug!(
        archive = %archive_path.display(),
        dest = %dest.display(),
        members,
        "archive unpacked"
    );
    Ok(())
}

/// Pack `source_dir` as a single top-level directory named after itself.
pub fn pack(source_dir: &Path, archive_path: &Path) -> Result<(), CoreError> {
    let name = source_dir
        .file_name()
        .ok_or_else(|| CoreError::Internal(format!("{} has no file name", source_dir.display())))?;
    pack_as(source_dir, Path::new(name), archive_path)
}

/// Pack `source_dir` under the in-archive path `arcname`.
///
/// The archive is written next to `archive_path` and renamed into place.
pub fn pack_as(source_dir: &Path, arcname: &Path, archive_path: &Path) -> Result<(), CoreError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(arcname, source_dir)
        .map_err(|e| CoreError::io(source_dir, e))?;
    let bytes = builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| CoreError::io(archive_path, e))?;

    files::write_atomic(archive_path, &bytes)?;
    debug!(
        archive = %archive_path.display(),
        bytes = bytes.len(),
        "archive written"
    );
    Ok(())
}
