//! Graft point list for the mastering tool.
//!
//! The new ISO is assembled from `iso-path=local-path` graft points: every
//! top-level entry of the source ISO is copied into the scratch tree and
//! grafted back at its original name, then the kickstart and any extra
//! paths are grafted at the ISO root.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::fs::{copy_entry, remove_named, ScratchTree, REGENERATED_ARTIFACTS};

/// One local path placed at `iso_path` inside the new image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graft {
    pub source: PathBuf,
    pub iso_path: String,
}

impl Graft {
    pub fn new(source: impl Into<PathBuf>, iso_path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            iso_path: iso_path.into(),
        }
    }

    /// `iso_path=source` with `\` and `=` escaped as the mastering tools expect.
    pub fn to_arg(&self) -> String {
        format!(
            "{}={}",
            escape_graft(&self.iso_path),
            escape_graft(&self.source.to_string_lossy())
        )
    }
}

fn escape_graft(part: &str) -> String {
    part.replace('\\', "\\\\").replace('=', "\\=")
}

/// Ordered graft points. Later entries win if an ISO path repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraftList {
    grafts: Vec<Graft>,
}

impl GraftList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, graft: Graft) {
        debug!("Graft {} -> {}", graft.source.display(), graft.iso_path);
        self.grafts.push(graft);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Graft> {
        self.grafts.iter()
    }

    /// Copy each top-level entry of `mount_dir` into the scratch tree and
    /// graft it back at its own name. Regenerated artifacts are skipped.
    pub fn from_source_tree(mount_dir: &Path, scratch: &ScratchTree) -> Result<Self> {
        info!("Copying {} into {}", mount_dir.display(), scratch.iso_dir().display());

        let mut names = Vec::new();
        for entry in fs::read_dir(mount_dir).map_err(|e| Error::io(mount_dir, e))? {
            let entry = entry.map_err(|e| Error::io(mount_dir, e))?;
            names.push(entry.file_name());
        }
        names.sort();

        let mut grafts = Self::new();
        for name in names {
            let name_str = name.to_string_lossy().into_owned();
            if REGENERATED_ARTIFACTS.contains(&name_str.as_str()) {
                debug!("Skipping {}", name_str);
                continue;
            }

            let dest = scratch.iso_dir().join(&name);
            copy_entry(&mount_dir.join(&name), &dest)?;
            grafts.push(Graft::new(dest, name_str));
        }

        Ok(grafts)
    }

    /// Graft the kickstart and each extra path at the ISO root.
    ///
    /// Extra directories are copied into the scratch tree first so that
    /// artifact stripping never touches the caller's files.
    pub fn add_root_files(
        &mut self,
        kickstart: &Path,
        extras: &[PathBuf],
        scratch: &ScratchTree,
    ) -> Result<()> {
        self.push(Graft::new(kickstart, base_name(kickstart)?));

        for extra in extras {
            let name = base_name(extra)?;
            if extra.is_dir() {
                let dest = scratch.extra_dir().join(&name);
                copy_entry(extra, &dest)?;
                self.push(Graft::new(dest, name));
            } else {
                self.push(Graft::new(extra, name));
            }
        }
        Ok(())
    }

    /// Delete boot catalogs and `TRANS.TBL` files from every grafted
    /// directory so the mastering tool writes fresh ones.
    pub fn strip_regenerated(&self) -> Result<usize> {
        let mut removed = 0;
        for graft in self.grafts.iter().filter(|g| g.source.is_dir()) {
            removed += remove_named(&graft.source, REGENERATED_ARTIFACTS)?.len();
        }
        if removed > 0 {
            info!("Removed {} stale boot catalog/TRANS.TBL files", removed);
        }
        Ok(removed)
    }
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("isolinux")).unwrap();
        fs::create_dir_all(root.join("images")).unwrap();
        fs::write(root.join("isolinux/isolinux.cfg"), "label linux\n").unwrap();
        fs::write(root.join("isolinux/boot.cat"), b"").unwrap();
        fs::write(root.join("images/TRANS.TBL"), b"").unwrap();
        fs::write(root.join("boot.catalog"), b"").unwrap();
        fs::write(root.join("TRANS.TBL"), b"").unwrap();
        fs::write(root.join(".discinfo"), "1\n").unwrap();
        temp
    }

    #[test]
    fn copies_top_level_entries_except_artifacts() {
        let src = source_tree();
        let scratch = ScratchTree::create().unwrap();
        let grafts = GraftList::from_source_tree(src.path(), &scratch).unwrap();

        let names: Vec<&str> = grafts.iter().map(|g| g.iso_path.as_str()).collect();
        assert_eq!(names, vec![".discinfo", "images", "isolinux"]);
        assert!(grafts.iter().all(|g| g.source.starts_with(scratch.iso_dir())));
        assert!(scratch.iso_dir().join("isolinux/isolinux.cfg").exists());
    }

    #[test]
    fn strip_removes_artifacts_from_directory_grafts() {
        let src = source_tree();
        let scratch = ScratchTree::create().unwrap();
        let grafts = GraftList::from_source_tree(src.path(), &scratch).unwrap();

        assert_eq!(grafts.strip_regenerated().unwrap(), 2);
        for graft in grafts.iter().filter(|g| g.source.is_dir()) {
            for name in REGENERATED_ARTIFACTS {
                assert!(remove_named(&graft.source, &[*name]).unwrap().is_empty());
            }
        }
        assert!(src.path().join("isolinux/boot.cat").exists());
    }

    #[test]
    fn root_files_are_grafted_by_base_name() {
        let temp = TempDir::new().unwrap();
        let ks = temp.path().join("ks.cfg");
        let extra_file = temp.path().join("driver.rpm");
        let extra_dir = temp.path().join("updates");
        fs::write(&ks, "text\n").unwrap();
        fs::write(&extra_file, b"").unwrap();
        fs::create_dir_all(&extra_dir).unwrap();
        fs::write(extra_dir.join("TRANS.TBL"), b"").unwrap();

        let scratch = ScratchTree::create().unwrap();
        let mut grafts = GraftList::new();
        grafts
            .add_root_files(&ks, &[extra_file.clone(), extra_dir.clone()], &scratch)
            .unwrap();

        let pairs: Vec<(PathBuf, &str)> = grafts
            .iter()
            .map(|g| (g.source.clone(), g.iso_path.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (ks, "ks.cfg"),
                (extra_file, "driver.rpm"),
                (scratch.extra_dir().join("updates"), "updates"),
            ]
        );

        grafts.strip_regenerated().unwrap();
        assert!(extra_dir.join("TRANS.TBL").exists());
        assert!(!scratch.extra_dir().join("updates/TRANS.TBL").exists());
    }

    #[test]
    fn graft_args_escape_separators() {
        let graft = Graft::new("/tmp/a=b", "a=b");
        assert_eq!(graft.to_arg(), "a\\=b=/tmp/a\\=b");
        assert_eq!(Graft::new("/tmp/ks.cfg", "ks.cfg").to_arg(), "ks.cfg=/tmp/ks.cfg");
    }
}
