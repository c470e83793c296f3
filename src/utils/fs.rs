use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Files the mastering tool writes itself. Stale copies must not be grafted.
pub const REGENERATED_ARTIFACTS: &[&str] = &["boot.cat", "boot.catalog", "TRANS.TBL"];

/// Per-run scratch area, removed when dropped.
///
/// `iso/` receives the copy of the source ISO tree and `extra/` receives
/// any extra directories added by the caller.
#[derive(Debug)]
pub struct ScratchTree {
    dir: TempDir,
}

impl ScratchTree {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("mkksiso-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        Self::with_dir(dir)
    }

    pub fn with_dir(dir: TempDir) -> Result<Self> {
        let tree = Self { dir };
        for sub in [tree.iso_dir(), tree.extra_dir()] {
            fs::create_dir_all(&sub).map_err(|e| Error::io(&sub, e))?;
        }
        info!("Created scratch tree: {}", tree.root().display());
        Ok(tree)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn iso_dir(&self) -> PathBuf {
        self.dir.path().join("iso")
    }

    pub fn extra_dir(&self) -> PathBuf {
        self.dir.path().join("extra")
    }

    /// Remove the tree now and report failures instead of swallowing them.
    pub fn close(self) -> Result<()> {
        let root = self.root().to_path_buf();
        debug!("Removing scratch tree: {}", root.display());
        self.dir.close().map_err(|e| Error::io(root, e))
    }
}

/// Copy a file or directory tree from `from` to `to`, keeping permission
/// bits and modification times. Symlinks are recreated, not followed.
pub fn copy_entry(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(from).map_err(|e| Error::io(from, e))?;
    if meta.is_dir() {
        copy_dir_recursive(from, to)
    } else {
        copy_one(from, to, &meta)
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    debug!("Copying directory: {} -> {}", from.display(), to.display());

    // Directory modes are applied last so read-only source dirs can be filled.
    let mut dir_modes = Vec::new();

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(from, e))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::io(entry.path(), io::Error::new(io::ErrorKind::Other, e)))?;
        let dest = to.join(rel);
        let meta = entry.metadata().map_err(|e| walk_error(entry.path(), e))?;

        if meta.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
            dir_modes.push((dest, meta));
        } else {
            copy_one(entry.path(), &dest, &meta)?;
        }
    }

    for (dir, meta) in dir_modes.iter().rev() {
        apply_metadata(dir, meta)?;
    }

    Ok(())
}

fn copy_one(from: &Path, to: &Path, meta: &fs::Metadata) -> Result<()> {
    if meta.file_type().is_symlink() {
        let target = fs::read_link(from).map_err(|e| Error::io(from, e))?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, to).map_err(|e| Error::io(to, e))?;
        #[cfg(not(unix))]
        fs::copy(from, to).map_err(|e| Error::io(to, e))?;
        return Ok(());
    }

    let mut src = File::open(from).map_err(|e| Error::io(from, e))?;
    let mut dst = File::create(to).map_err(|e| Error::io(to, e))?;
    io::copy(&mut src, &mut dst).map_err(|e| Error::io(to, e))?;
    if let Ok(mtime) = meta.modified() {
        dst.set_modified(mtime).map_err(|e| Error::io(to, e))?;
    }
    drop(dst);

    apply_metadata(to, meta)
}

fn apply_metadata(path: &Path, meta: &fs::Metadata) -> Result<()> {
    fs::set_permissions(path, meta.permissions()).map_err(|e| Error::io(path, e))
}

fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    Error::io(path, e.into())
}

/// Delete every file under `dir` whose name is one of `names`.
///
/// Returns the removed paths.
pub fn remove_named(dir: &Path, names: &[&str]) -> Result<Vec<PathBuf>> {
    let mut doomed = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if names.iter().any(|n| entry.file_name() == *n) {
            doomed.push(entry.into_path());
        }
    }

    for path in &doomed {
        debug!("Removing regenerated artifact: {}", path.display());
        fs::remove_file(path).map_err(|e| Error::io(path, e))?;
    }

    Ok(doomed)
}

/// True if `path` is, or contains, a regular file of at least `limit` bytes.
///
/// Symlinks are grafted as links, so they are neither followed nor sized.
pub fn has_file_at_least(path: &Path, limit: u64) -> Result<bool> {
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(path, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let len = entry
            .metadata()
            .map_err(|e| walk_error(entry.path(), e))?
            .len();
        if len >= limit {
            debug!("{} is {} bytes", entry.path().display(), len);
            return Ok(true);
        }
    }
    Ok(false)
}
