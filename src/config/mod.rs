use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Everything one run needs to know, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Kickstart file placed at the ISO root.
    pub kickstart: PathBuf,
    /// Installer ISO to start from.
    pub input_iso: PathBuf,
    /// Where the new ISO is written.
    pub output_iso: PathBuf,
    /// Extra files and directories placed at the ISO root.
    pub add_paths: Vec<PathBuf>,
    /// Extra kernel command line appended after `inst.ks=`.
    pub cmdline: String,
    /// Volume label for the new ISO. Defaults to the input ISO's label.
    pub volid: Option<String>,
    /// Embed an installer media checksum after mastering.
    pub implant_md5: bool,
}

impl Options {
    pub fn new(
        kickstart: impl Into<PathBuf>,
        input_iso: impl Into<PathBuf>,
        output_iso: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kickstart: kickstart.into(),
            input_iso: input_iso.into(),
            output_iso: output_iso.into(),
            add_paths: Vec::new(),
            cmdline: String::new(),
            volid: None,
            implant_md5: true,
        }
    }

    /// Every path that must exist before the run starts.
    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        [self.kickstart.as_path(), self.input_iso.as_path()]
            .into_iter()
            .chain(self.add_paths.iter().map(PathBuf::as_path))
    }

    /// Fail with the full list of missing inputs, not only the first one.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<PathBuf> = self
            .inputs()
            .filter(|p| !p.exists())
            .map(Path::to_path_buf)
            .collect();

        if !missing.is_empty() {
            return Err(Error::MissingInputs(missing));
        }

        debug!("All {} input paths exist", self.inputs().count());
        Ok(())
    }
}

/// Host data files that backends and boot-image regenerators depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFiles {
    /// Syslinux MBR used for hybrid x86_64 images.
    pub isohybrid_mbr: PathBuf,
    /// HFS type/creator mapping for PowerPC images.
    pub ppc_hfs_mapping: PathBuf,
    /// Volume icon for the Apple EFI boot image.
    pub mac_icon: PathBuf,
    /// Disk name file for the Apple EFI boot image.
    pub mac_diskname: PathBuf,
}

impl Default for HostFiles {
    fn default() -> Self {
        Self {
            isohybrid_mbr: PathBuf::from("/usr/share/syslinux/isohdpfx.bin"),
            ppc_hfs_mapping: PathBuf::from(
                "/usr/share/lorax/templates.d/99-generic/config_files/ppc/mapping",
            ),
            mac_icon: PathBuf::from("/usr/share/pixmaps/bootloader/fedora.icns"),
            mac_diskname: PathBuf::from("/usr/share/pixmaps/bootloader/fedora-media.vol"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn validate_passes_when_everything_exists() {
        let temp = TempDir::new().unwrap();
        let ks = temp.path().join("ks.cfg");
        let iso = temp.path().join("boot.iso");
        fs::write(&ks, "text\n").unwrap();
        fs::write(&iso, b"").unwrap();

        let options = Options::new(&ks, &iso, temp.path().join("out.iso"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn validate_reports_all_missing_paths() {
        let temp = TempDir::new().unwrap();
        let iso = temp.path().join("boot.iso");
        fs::write(&iso, b"").unwrap();

        let mut options = Options::new(
            temp.path().join("ks.cfg"),
            &iso,
            temp.path().join("out.iso"),
        );
        options.add_paths = vec![temp.path().join("extra"), iso.clone()];

        match options.validate() {
            Err(Error::MissingInputs(missing)) => {
                assert_eq!(
                    missing,
                    vec![temp.path().join("ks.cfg"), temp.path().join("extra")]
                );
            }
            other => panic!("expected MissingInputs, got {:?}", other),
        }
    }

    #[test]
    fn output_is_not_an_input() {
        let options = Options::new("ks.cfg", "in.iso", "out.iso");
        assert!(options.inputs().all(|p| p != Path::new("out.iso")));
    }
}
