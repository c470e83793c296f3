//! ISO mastering backends.
//!
//! One [`BackendDescriptor`] exists per (tool family, platform) pair. The
//! selector walks them in preference order, probing each, and keeps the
//! first that can run here. A selected [`Backend`] turns a graft list into
//! an ordered plan of tool invocations: mastering, then the optional
//! hybrid MBR/GPT patch, then the checksum implant.

use std::path::Path;

use tracing::{debug, info};

use crate::config::HostFiles;
use crate::core::probe::{Probe, Requirements, Resolved, Unavailable};
use crate::error::{Error, Result};
use crate::iso::grafts::GraftList;
use crate::iso::{EfiMode, EFIBOOT_IMG, MACBOOT_IMG};
use crate::utils::fs::has_file_at_least;
use crate::utils::process::Invocation;

/// Files at or above this size need the large-file flag.
pub const LARGE_FILE: u64 = 4 * 1024 * 1024 * 1024;

const IMPLANT_TOOL: &str = "implantisomd5";
const HYBRID_TOOL: &str = "isohybrid";

/// Mastering tool family, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// xorriso's mkisofs emulation.
    Xorrisofs,
    /// Classic mkisofs/genisoimage.
    Mkisofs,
}

impl Family {
    fn program(self) -> &'static str {
        match self {
            Family::Xorrisofs => "xorrisofs",
            Family::Mkisofs => "mkisofs",
        }
    }

    fn large_file_flags(self) -> &'static [&'static str] {
        match self {
            Family::Xorrisofs => &["-iso-level", "3"],
            Family::Mkisofs => &["-allow-limited-size"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    X86_64,
    Aarch64,
    Ppc,
    S390,
}

impl Platform {
    const ALL: [Platform; 4] = [Platform::X86_64, Platform::Aarch64, Platform::Ppc, Platform::S390];

    fn arches(self) -> Vec<&'static str> {
        match self {
            Platform::X86_64 => vec!["x86_64"],
            Platform::Aarch64 => vec!["aarch64", "arm"],
            Platform::Ppc => vec!["ppc", "ppc64", "ppc64le"],
            Platform::S390 => vec!["s390", "s390x"],
        }
    }
}

/// A mastering backend candidate, not yet probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub name: &'static str,
    pub family: Family,
    pub platform: Platform,
    pub requirements: Requirements,
    pub implant_md5: bool,
}

impl BackendDescriptor {
    pub fn new(family: Family, platform: Platform, host: &HostFiles, implant_md5: bool) -> Self {
        let name = match (family, platform) {
            (Family::Xorrisofs, Platform::X86_64) => "xorrisofs-x86_64",
            (Family::Xorrisofs, Platform::Aarch64) => "xorrisofs-aarch64",
            (Family::Xorrisofs, Platform::Ppc) => "xorrisofs-ppc",
            (Family::Xorrisofs, Platform::S390) => "xorrisofs-s390",
            (Family::Mkisofs, Platform::X86_64) => "mkisofs-x86_64",
            (Family::Mkisofs, Platform::Aarch64) => "mkisofs-aarch64",
            (Family::Mkisofs, Platform::Ppc) => "mkisofs-ppc",
            (Family::Mkisofs, Platform::S390) => "mkisofs-s390",
        };

        let mut tools = vec![family.program()];
        if hybridizes(family, platform) {
            tools.push(HYBRID_TOOL);
        }
        if implant_md5 {
            tools.push(IMPLANT_TOOL);
        }

        let files = match (family, platform) {
            (Family::Xorrisofs, Platform::X86_64) => vec![host.isohybrid_mbr.clone()],
            (Family::Mkisofs, Platform::Ppc) => vec![host.ppc_hfs_mapping.clone()],
            _ => Vec::new(),
        };

        Self {
            name,
            family,
            platform,
            requirements: Requirements {
                arches: platform.arches(),
                tools,
                files,
            },
            implant_md5,
        }
    }

    /// Probe this candidate, recording tool paths on success.
    pub fn probe(&self, probe: &Probe) -> std::result::Result<Backend, Unavailable> {
        let resolved = probe.check(&self.requirements)?;
        Ok(Backend {
            descriptor: self.clone(),
            resolved,
        })
    }
}

/// Only the legacy family on x86_64/aarch64 needs a separate hybrid pass.
/// It runs on BIOS-only media too, so the image still boots from USB.
fn hybridizes(family: Family, platform: Platform) -> bool {
    family == Family::Mkisofs && matches!(platform, Platform::X86_64 | Platform::Aarch64)
}

/// Every candidate in preference order: xorrisofs variants, then mkisofs.
pub fn candidates(host: &HostFiles, implant_md5: bool) -> Vec<BackendDescriptor> {
    [Family::Xorrisofs, Family::Mkisofs]
        .into_iter()
        .flat_map(|family| {
            Platform::ALL
                .into_iter()
                .map(move |platform| BackendDescriptor::new(family, platform, host, implant_md5))
        })
        .collect()
}

/// Return the first candidate `probe` accepts. Later candidates are not probed.
pub fn select_backend<F>(candidates: &[BackendDescriptor], mut probe: F) -> Result<Backend>
where
    F: FnMut(&BackendDescriptor) -> std::result::Result<Backend, Unavailable>,
{
    for candidate in candidates {
        match probe(candidate) {
            Ok(backend) => {
                info!("Using ISO backend {}", candidate.name);
                return Ok(backend);
            }
            Err(reason) => debug!("{} unavailable: {}", candidate.name, reason),
        }
    }
    Err(Error::NoBackend)
}

/// A probed backend, ready to master an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub descriptor: BackendDescriptor,
    resolved: Resolved,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Build the full invocation plan for one image.
    pub fn plan(
        &self,
        grafts: &GraftList,
        volid: &str,
        output: &Path,
        efimode: EfiMode,
    ) -> Result<Vec<Invocation>> {
        let family = self.descriptor.family;
        let platform = self.descriptor.platform;

        let mut master = Invocation::new("ISO mastering", self.resolved.program(family.program()))
            .arg("-o")
            .arg_path(output)
            .args(["-R", "-J", "-V", volid])
            .args(self.boot_flags(efimode));

        if self.needs_large_file_support(grafts)? {
            info!("Grafts include a file of 4GiB or more, enabling large file support");
            master = master.args(family.large_file_flags());
        }

        master = master
            .arg("-graft-points")
            .args(grafts.iter().map(|g| g.to_arg()));

        let mut plan = vec![master];

        if hybridizes(family, platform) {
            let mut hybrid = Invocation::new("Hybrid ISO", self.resolved.program(HYBRID_TOOL));
            if efimode >= EfiMode::EfiBoot {
                hybrid = hybrid.arg("--uefi");
            }
            if efimode >= EfiMode::MacBoot {
                hybrid = hybrid.arg("--mac");
            }
            plan.push(hybrid.arg_path(output));
        }

        if self.descriptor.implant_md5 {
            plan.push(
                Invocation::new("Checksum implant", self.resolved.program(IMPLANT_TOOL))
                    .arg_path(output),
            );
        }

        Ok(plan)
    }

    fn needs_large_file_support(&self, grafts: &GraftList) -> Result<bool> {
        for graft in grafts.iter() {
            if has_file_at_least(&graft.source, LARGE_FILE)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Boot catalog flags for this platform. Data files are taken from the
    /// requirement list by position.
    fn boot_flags(&self, efimode: EfiMode) -> Vec<String> {
        let family = self.descriptor.family;
        let first_file = || {
            self.descriptor
                .requirements
                .files
                .first()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let mut flags = Vec::new();

        match self.descriptor.platform {
            Platform::X86_64 => {
                if family == Family::Xorrisofs {
                    extend(&mut flags, &["-isohybrid-mbr", &first_file()]);
                }
                extend(
                    &mut flags,
                    &[
                        "-b",
                        "isolinux/isolinux.bin",
                        "-c",
                        "isolinux/boot.cat",
                        "-no-emul-boot",
                        "-boot-load-size",
                        "4",
                        "-boot-info-table",
                    ],
                );
                extend_efi(&mut flags, family, efimode);
            }
            Platform::Aarch64 => extend_efi(&mut flags, family, efimode),
            Platform::Ppc => {
                extend(&mut flags, &["-U", "-chrp-boot", "-sysid", "PPC"]);
                if family == Family::Mkisofs {
                    extend(
                        &mut flags,
                        &[
                            "-part",
                            "-hfs",
                            "-T",
                            "-l",
                            "-map",
                            &first_file(),
                            "-hfs-bless",
                            "boot/grub/powerpc-ieee1275",
                            "-no-desktop",
                            "-allow-multidot",
                        ],
                    );
                }
            }
            Platform::S390 => extend(
                &mut flags,
                &["-b", "images/cdboot.img", "-c", "images/boot.cat", "-no-emul-boot"],
            ),
        }

        flags
    }
}

fn extend(flags: &mut Vec<String>, args: &[&str]) {
    flags.extend(args.iter().map(|a| a.to_string()));
}

fn extend_efi(flags: &mut Vec<String>, family: Family, efimode: EfiMode) {
    if efimode >= EfiMode::EfiBoot {
        extend(flags, &["-eltorito-alt-boot", "-e", EFIBOOT_IMG, "-no-emul-boot"]);
        if family == Family::Xorrisofs {
            extend(flags, &["-isohybrid-gpt-basdat"]);
        }
    }
    if efimode >= EfiMode::MacBoot {
        extend(flags, &["-eltorito-alt-boot", "-e", MACBOOT_IMG, "-no-emul-boot"]);
        if family == Family::Xorrisofs {
            extend(flags, &["-isohybrid-gpt-hfsplus"]);
        }
    }
}
