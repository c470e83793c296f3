use std::path::Path;

use tracing::{info, warn};

use crate::config::{HostFiles, Options};
use crate::core::probe::Probe;
use crate::error::{Error, Result};
use crate::iso::backend::{candidates, select_backend};
use crate::iso::boot::{configure_bootloaders, BootEdit};
use crate::iso::efiboot::{rebuild_s390_cdboot, regenerators_for, Regenerator};
use crate::iso::{EfiMode, GraftList, IsoMount, IsoPackager};
use crate::utils::fs::ScratchTree;

/// Runs one kickstart injection from start to finish.
pub struct Builder {
    options: Options,
    host: HostFiles,
    probe: Probe,
}

impl Builder {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            host: HostFiles::default(),
            probe: Probe::host(),
        }
    }

    pub fn with_host_files(mut self, host: HostFiles) -> Self {
        self.host = host;
        self
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    /// Check privileges and inputs, mount the source ISO and build from it.
    ///
    /// The ISO is unmounted before any error is returned.
    pub fn build(&self) -> Result<()> {
        ensure_root()?;
        self.options.validate()?;

        let mut iso = IsoMount::mount(&self.options.input_iso)?;
        self.build_mounted(&mut iso)
    }

    fn build_mounted(&self, iso: &mut IsoMount) -> Result<()> {
        let result = self.build_from(iso.mount_dir(), iso.label());
        let unmounted = iso.unmount();
        result?;
        unmounted
    }

    /// Build the new ISO from an already accessible source tree.
    pub fn build_from(&self, source: &Path, source_label: &str) -> Result<()> {
        info!("Starting kickstart ISO build");

        let efimode = EfiMode::detect(source);
        let regenerators = regenerators_for(efimode, &self.host, &self.probe)?;

        let backends = candidates(&self.host, self.options.implant_md5);
        let backend = select_backend(&backends, |c| c.probe(&self.probe))?;
        let packager = IsoPackager::new(backend);

        let scratch = ScratchTree::create()?;
        let result = self.build_in(
            &scratch,
            source,
            source_label,
            efimode,
            &regenerators,
            &packager,
        );
        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch tree: {}", e);
        }
        result
    }

    fn build_in(
        &self,
        scratch: &ScratchTree,
        source: &Path,
        source_label: &str,
        efimode: EfiMode,
        regenerators: &[Regenerator],
        packager: &IsoPackager,
    ) -> Result<()> {
        let opts = &self.options;
        let volid = opts.volid.as_deref().unwrap_or(source_label);
        info!("Volume label: {} (source: {})", volid, source_label);

        let mut grafts = GraftList::from_source_tree(source, scratch)?;

        let tree = scratch.iso_dir();
        let edit = BootEdit::new(source_label, volid, &opts.kickstart, &opts.cmdline);
        configure_bootloaders(&tree, &edit, efimode)?;

        for regenerator in regenerators {
            regenerator.run(&tree)?;
        }
        rebuild_s390_cdboot(&tree, &self.probe)?;

        grafts.add_root_files(&opts.kickstart, &opts.add_paths, scratch)?;
        grafts.strip_regenerated()?;

        packager.package_final_iso(&grafts, volid, &opts.output_iso, efimode)
    }
}

/// Loop mounting needs root.
#[cfg(unix)]
pub fn ensure_root() -> Result<()> {
    if nix::unistd::geteuid().is_root() {
        Ok(())
    } else {
        Err(Error::NotRoot)
    }
}

#[cfg(not(unix))]
pub fn ensure_root() -> Result<()> {
    Err(Error::NotRoot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso::mount::tests::{logged_mount, release_count};
    use tempfile::TempDir;

    #[test]
    fn failed_build_unmounts_before_returning() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("umount.log");
        let empty_path = TempDir::new().unwrap();
        let builder = Builder::new(Options::new("ks.cfg", "in.iso", "out.iso"))
            .with_probe(Probe::new("x86_64", Some(empty_path.path().into())));

        let mut iso = logged_mount(temp.path(), &log);
        let err = builder.build_mounted(&mut iso).unwrap_err();

        assert!(matches!(err, Error::NoBackend));
        assert_eq!(release_count(&log), 1);
        drop(iso);
        assert_eq!(release_count(&log), 1);
    }
}
