use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::iso::backend::Backend;
use crate::iso::grafts::GraftList;
use crate::iso::EfiMode;
use crate::utils::process::run_all;

/// Drives the selected backend to write the final image.
pub struct IsoPackager {
    backend: Backend,
}

impl IsoPackager {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Master, hybridize and checksum the image, in that order.
    ///
    /// A failed step leaves whatever the tool wrote at `output`.
    pub fn package_final_iso(
        &self,
        grafts: &GraftList,
        volid: &str,
        output: &Path,
        efimode: EfiMode,
    ) -> Result<()> {
        info!("Packaging final ISO with {}", self.backend.name());

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let plan = self.backend.plan(grafts, volid, output, efimode)?;
        run_all(&plan)?;

        info!("Final ISO created: {}", output.display());
        Ok(())
    }
}
