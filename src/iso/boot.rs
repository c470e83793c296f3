//! Boot configuration rewriting.
//!
//! Each editor patches one known config file in the scratch copy of the
//! ISO: the old volume label is swapped for the new one and the kickstart
//! boot argument is appended to kernel command lines. Lines that need no
//! change are written back exactly as read.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::iso::EfiMode;
use crate::utils::escape::udev_escape;

pub const ISOLINUX_CFG: &str = "isolinux/isolinux.cfg";
/// EFI config candidates, grub first.
pub const EFI_CFGS: &[&str] = &["EFI/BOOT/grub.cfg", "EFI/BOOT/BOOT.conf"];
pub const PPC_GRUB_CFG: &str = "boot/grub/grub.cfg";
pub const S390_PRM: &str = "images/generic.prm";

/// Label substitution and boot argument shared by every editor in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEdit {
    old_label: String,
    new_label: String,
    old_escaped: String,
    new_escaped: String,
    args: String,
}

impl BootEdit {
    pub fn new(old_label: &str, new_label: &str, kickstart: &Path, cmdline: &str) -> Self {
        let new_escaped = udev_escape(new_label);
        let ks_name = kickstart
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args = format!("inst.ks=hd:LABEL={}:/{} {}", new_escaped, ks_name, cmdline);

        Self {
            old_label: old_label.to_string(),
            new_label: new_label.to_string(),
            old_escaped: udev_escape(old_label),
            new_escaped,
            args,
        }
    }

    /// The boot argument string appended by every editor.
    pub fn args(&self) -> &str {
        &self.args
    }

    fn relabel_escaped(&self, line: &str) -> String {
        replace_label(line, &self.old_escaped, &self.new_escaped)
    }

    fn with_args(&self, line: String) -> String {
        format!("{} {}", line, self.args)
    }

    pub fn isolinux_line(&self, line: &str) -> String {
        let line = self.relabel_escaped(line);
        if line.contains("append") {
            self.with_args(line)
        } else {
            line
        }
    }

    pub fn efi_line(&self, line: &str) -> String {
        let trimmed = line.trim_start();
        if trimmed.starts_with("search") {
            // grub's search -l matches the raw volume id.
            let line = replace_label(line, &self.old_label, &self.new_label);
            return if self.old_escaped != self.old_label {
                self.relabel_escaped(&line)
            } else {
                line
            };
        }

        let line = self.relabel_escaped(line);
        if trimmed.starts_with("linux") {
            self.with_args(line)
        } else {
            line
        }
    }

    pub fn ppc_line(&self, line: &str) -> String {
        let line = self.relabel_escaped(line);
        if line.trim_start().starts_with("linux ") {
            self.with_args(line)
        } else {
            line
        }
    }
}

fn replace_label(line: &str, old: &str, new: &str) -> String {
    if old.is_empty() || old == new {
        line.to_string()
    } else {
        line.replace(old, new)
    }
}

/// Apply `edit` to every line of `text`. Each output line ends in `\n`.
pub fn rewrite_lines(text: &str, edit: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        out.push_str(&edit(line.strip_suffix('\n').unwrap_or(line)));
        out.push('\n');
    }
    out
}

fn rewrite_file(path: &Path, edit: impl Fn(&str) -> String) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    fs::write(path, rewrite_lines(&text, edit)).map_err(|e| Error::io(path, e))?;
    debug!("Rewrote {}", path.display());
    Ok(())
}

/// Patch `isolinux/isolinux.cfg`. Returns false if the media has none.
pub fn edit_isolinux(tree: &Path, edit: &BootEdit) -> Result<bool> {
    let cfg = tree.join(ISOLINUX_CFG);
    if !cfg.exists() {
        warn!("No {} found, skipping BIOS boot config", ISOLINUX_CFG);
        return Ok(false);
    }

    info!("Configuring ISOLINUX bootloader: {}", cfg.display());
    rewrite_file(&cfg, |line| edit.isolinux_line(line))?;
    Ok(true)
}

/// Patch every EFI config present. At least one must exist.
pub fn edit_efi(tree: &Path, edit: &BootEdit) -> Result<Vec<PathBuf>> {
    let candidates: Vec<PathBuf> = EFI_CFGS.iter().map(|c| tree.join(c)).collect();
    let present: Vec<PathBuf> = candidates.iter().filter(|c| c.exists()).cloned().collect();

    if present.is_empty() {
        return Err(Error::MissingEfiConfig(candidates));
    }

    for cfg in &present {
        info!("Configuring EFI bootloader: {}", cfg.display());
        rewrite_file(cfg, |line| edit.efi_line(line))?;
    }
    Ok(present)
}

/// Patch the PowerPC `boot/grub/grub.cfg`. Returns false if absent.
pub fn edit_ppc(tree: &Path, edit: &BootEdit) -> Result<bool> {
    let cfg = tree.join(PPC_GRUB_CFG);
    if !cfg.exists() {
        warn!("No {} found, skipping PowerPC boot config", PPC_GRUB_CFG);
        return Ok(false);
    }

    info!("Configuring PowerPC GRUB bootloader: {}", cfg.display());
    rewrite_file(&cfg, |line| edit.ppc_line(line))?;
    Ok(true)
}

/// Append the boot argument line to `images/generic.prm`. Returns false if absent.
pub fn edit_s390(tree: &Path, edit: &BootEdit) -> Result<bool> {
    let prm = tree.join(S390_PRM);
    if !prm.exists() {
        warn!("No {} found, skipping S390 parameter file", S390_PRM);
        return Ok(false);
    }

    info!("Configuring S390 parameter file: {}", prm.display());
    let mut text = fs::read_to_string(&prm).map_err(|e| Error::io(&prm, e))?;
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(edit.args());
    text.push('\n');
    fs::write(&prm, text).map_err(|e| Error::io(&prm, e))?;
    Ok(true)
}

/// Run every editor that applies to this media.
///
/// The EFI editor only runs when an EFI boot image was detected.
pub fn configure_bootloaders(tree: &Path, edit: &BootEdit, efimode: EfiMode) -> Result<()> {
    info!("Boot argument: {}", edit.args());
    edit_isolinux(tree, edit)?;
    if efimode > EfiMode::NoEfi {
        edit_efi(tree, edit)?;
    }
    edit_ppc(tree, edit)?;
    edit_s390(tree, edit)?;
    Ok(())
}
