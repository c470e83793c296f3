//! Boot image regeneration.
//!
//! EFI and Apple boot images are FAT images holding a copy of `EFI/BOOT`.
//! After the EFI configs in the scratch tree are edited the images must be
//! rebuilt from that tree, or firmware would still boot the old configs.

use std::path::Path;

use tracing::{info, warn, Level};

use crate::config::HostFiles;
use crate::core::probe::{Probe, Requirements, Resolved};
use crate::error::{Error, Result};
use crate::iso::{EfiMode, EFIBOOT_IMG, MACBOOT_IMG};
use crate::utils::process::Invocation;

const MKEFIBOOT: &str = "mkefiboot";
const MK_S390IMAGE: &str = "mk-s390image";
const EFI_DIR: &str = "EFI/BOOT";
const FAT_LABEL: &str = "--label=ANACONDA";

pub const S390_CDBOOT_IMG: &str = "images/cdboot.img";
const S390_KERNEL: &str = "images/kernel.img";
const S390_INITRD: &str = "images/initrd.img";
const S390_PRM: &str = "images/generic.prm";

/// Which boot image a regenerator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootImage {
    Efi,
    Mac,
}

impl BootImage {
    fn path(self) -> &'static str {
        match self {
            BootImage::Efi => EFIBOOT_IMG,
            BootImage::Mac => MACBOOT_IMG,
        }
    }
}

/// A probed `mkefiboot` wrapper for one boot image.
#[derive(Debug, Clone)]
pub struct Regenerator {
    image: BootImage,
    mac_files: Vec<String>,
    resolved: Resolved,
}

impl Regenerator {
    pub fn requirements(image: BootImage, host: &HostFiles) -> Requirements {
        let files = match image {
            BootImage::Efi => Vec::new(),
            BootImage::Mac => vec![host.mac_icon.clone(), host.mac_diskname.clone()],
        };
        Requirements {
            arches: Vec::new(),
            tools: vec![MKEFIBOOT],
            files,
        }
    }

    /// Probe for the tool and data files. A failed probe is fatal for the
    /// caller: the media has this image and it cannot be rebuilt.
    pub fn probe(image: BootImage, host: &HostFiles, probe: &Probe) -> Result<Self> {
        let req = Self::requirements(image, host);
        let resolved = probe.check(&req).map_err(|reason| Error::MissingRegenerator {
            image: image.path(),
            reason,
        })?;
        Ok(Self {
            image,
            mac_files: req
                .files
                .iter()
                .map(|f| f.to_string_lossy().into_owned())
                .collect(),
            resolved,
        })
    }

    /// `mkefiboot` is verbose only when debug logging is enabled.
    pub fn invocation(&self, tree: &Path) -> Invocation {
        self.invocation_with(tree, tracing::enabled!(Level::DEBUG))
    }

    fn invocation_with(&self, tree: &Path, verbose: bool) -> Invocation {
        let mut inv = Invocation::new(
            match self.image {
                BootImage::Efi => "EFI boot image",
                BootImage::Mac => "Mac boot image",
            },
            self.resolved.program(MKEFIBOOT),
        )
        .arg(FAT_LABEL);
        if verbose {
            inv = inv.arg("--debug");
        }

        if let (BootImage::Mac, [icon, diskname]) = (self.image, self.mac_files.as_slice()) {
            inv = inv
                .arg("--apple")
                .arg(format!("--icon={}", icon))
                .arg(format!("--diskname={}", diskname))
                .arg("--product=Fedora");
        }

        inv.arg_path(&tree.join(EFI_DIR))
            .arg_path(&tree.join(self.image.path()))
    }

    pub fn run(&self, tree: &Path) -> Result<()> {
        info!("Rebuilding {}", self.image.path());
        self.invocation(tree).run()
    }
}

/// Regenerators for every EFI image the media carries, probed up front.
pub fn regenerators_for(
    efimode: EfiMode,
    host: &HostFiles,
    probe: &Probe,
) -> Result<Vec<Regenerator>> {
    let mut regens = Vec::new();
    if efimode >= EfiMode::EfiBoot {
        regens.push(Regenerator::probe(BootImage::Efi, host, probe)?);
    }
    if efimode >= EfiMode::MacBoot {
        regens.push(Regenerator::probe(BootImage::Mac, host, probe)?);
    }
    Ok(regens)
}

/// Rebuild `images/cdboot.img` from the kernel, initrd and edited parameter
/// file. Skipped with a warning when the tool is not installed.
pub fn rebuild_s390_cdboot(tree: &Path, probe: &Probe) -> Result<bool> {
    match s390_cdboot_invocation(tree, probe) {
        Some(inv) => {
            info!("Rebuilding {}", S390_CDBOOT_IMG);
            inv.run()?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn s390_cdboot_invocation(tree: &Path, probe: &Probe) -> Option<Invocation> {
    if !tree.join(S390_CDBOOT_IMG).exists() {
        return None;
    }

    let req = Requirements {
        arches: Vec::new(),
        tools: vec![MK_S390IMAGE],
        files: vec![tree.join(S390_KERNEL), tree.join(S390_INITRD), tree.join(S390_PRM)],
    };
    let resolved = match probe.check(&req) {
        Ok(resolved) => resolved,
        Err(reason) => {
            warn!("Not rebuilding {}: {}", S390_CDBOOT_IMG, reason);
            return None;
        }
    };

    Some(
        Invocation::new("S390 boot image", resolved.program(MK_S390IMAGE))
            .arg_path(&tree.join(S390_KERNEL))
            .arg_path(&tree.join(S390_CDBOOT_IMG))
            .arg("-r")
            .arg_path(&tree.join(S390_INITRD))
            .arg("-p")
            .arg_path(&tree.join(S390_PRM)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::probe::tests::fake_bin;
    use crate::core::probe::Unavailable;
    use std::fs;
    use tempfile::TempDir;

    fn probe_with(tools: &[&str]) -> (TempDir, Probe) {
        let bin = fake_bin(tools);
        let probe = Probe::new("x86_64", Some(bin.path().as_os_str().to_owned()));
        (bin, probe)
    }

    fn host_with_mac_files(dir: &Path) -> HostFiles {
        let host = HostFiles {
            mac_icon: dir.join("fedora.icns"),
            mac_diskname: dir.join("fedora-media.vol"),
            ..HostFiles::default()
        };
        fs::write(&host.mac_icon, b"").unwrap();
        fs::write(&host.mac_diskname, b"").unwrap();
        host
    }

    #[test]
    fn no_efi_needs_no_regenerators() {
        let (_bin, probe) = probe_with(&[]);
        let regens = regenerators_for(EfiMode::NoEfi, &HostFiles::default(), &probe).unwrap();
        assert!(regens.is_empty());
    }

    #[test]
    fn efi_regenerator_rebuilds_efiboot() {
        let (bin, probe) = probe_with(&["mkefiboot"]);
        let regens = regenerators_for(EfiMode::EfiBoot, &HostFiles::default(), &probe).unwrap();
        assert_eq!(regens.len(), 1);
        assert_eq!(
            regens[0].invocation_with(Path::new("/tmp/iso"), false).to_string(),
            format!(
                "{} --label=ANACONDA /tmp/iso/EFI/BOOT /tmp/iso/images/efiboot.img",
                bin.path().join("mkefiboot").display()
            )
        );
    }

    #[test]
    fn mkefiboot_debug_follows_log_level() {
        let (_bin, probe) = probe_with(&["mkefiboot"]);
        let regens = regenerators_for(EfiMode::EfiBoot, &HostFiles::default(), &probe).unwrap();
        let tree = Path::new("/tmp/iso");

        assert!(regens[0].invocation_with(tree, true).has_arg("--debug"));

        let quiet = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .finish();
        tracing::subscriber::with_default(quiet, || {
            assert!(!regens[0].invocation(tree).has_arg("--debug"));
        });

        let verbose = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(verbose, || {
            assert!(regens[0].invocation(tree).has_arg("--debug"));
        });
    }

    #[test]
    fn mac_regenerator_uses_apple_mode() {
        let (bin, probe) = probe_with(&["mkefiboot"]);
        let host = host_with_mac_files(bin.path());
        let regens = regenerators_for(EfiMode::MacBoot, &host, &probe).unwrap();
        assert_eq!(regens.len(), 2);

        let mac = regens[1].invocation(Path::new("/tmp/iso"));
        assert_eq!(mac.step, "Mac boot image");
        assert!(mac.has_arg("--apple"));
        assert!(mac.has_arg(&format!("--icon={}", host.mac_icon.display())));
        assert!(mac.has_arg("/tmp/iso/images/macboot.img"));
    }

    #[test]
    fn missing_mac_files_disqualify_the_probe() {
        let (bin, probe) = probe_with(&["mkefiboot"]);
        let host = HostFiles {
            mac_icon: bin.path().join("missing.icns"),
            mac_diskname: bin.path().join("missing.vol"),
            ..HostFiles::default()
        };
        let err = regenerators_for(EfiMode::MacBoot, &host, &probe).unwrap_err();
        match err {
            Error::MissingRegenerator { image, reason } => {
                assert_eq!(image, MACBOOT_IMG);
                assert!(matches!(reason, Unavailable::File(_)));
            }
            other => panic!("expected MissingRegenerator, got {:?}", other),
        }
    }

    #[test]
    fn missing_mkefiboot_is_reported() {
        let (_bin, probe) = probe_with(&[]);
        assert!(matches!(
            regenerators_for(EfiMode::EfiBoot, &HostFiles::default(), &probe),
            Err(Error::MissingRegenerator { .. })
        ));
    }

    #[test]
    fn s390_rebuild_is_skipped_without_tool() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("images")).unwrap();
        fs::write(temp.path().join(S390_CDBOOT_IMG), b"").unwrap();
        let (_bin, probe) = probe_with(&[]);
        assert!(!rebuild_s390_cdboot(temp.path(), &probe).unwrap());
    }

    #[test]
    fn s390_rebuild_uses_edited_parameter_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("images")).unwrap();
        for f in [S390_CDBOOT_IMG, S390_KERNEL, S390_INITRD, S390_PRM] {
            fs::write(temp.path().join(f), b"").unwrap();
        }
        let (bin, probe) = probe_with(&["mk-s390image"]);
        let inv = s390_cdboot_invocation(temp.path(), &probe).unwrap();
        assert_eq!(inv.program, bin.path().join("mk-s390image"));
        assert!(inv.has_arg("-p"));
        assert_eq!(inv.args.last().unwrap(), temp.path().join(S390_PRM).as_os_str());
    }
}
