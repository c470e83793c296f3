pub mod backend;
pub mod boot;
pub mod efiboot;
pub mod grafts;
pub mod mount;
pub mod packager;

use std::path::Path;

use tracing::info;

pub use backend::{Backend, BackendDescriptor, Family};
pub use boot::BootEdit;
pub use grafts::{Graft, GraftList};
pub use mount::IsoMount;
pub use packager::IsoPackager;

/// UEFI boot image, relative to the ISO root.
pub const EFIBOOT_IMG: &str = "images/efiboot.img";
/// Apple EFI boot image, relative to the ISO root.
pub const MACBOOT_IMG: &str = "images/macboot.img";

/// Which EFI boot images the source media carries.
///
/// Ordered: `MacBoot` media also gets every `EfiBoot` treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EfiMode {
    NoEfi = 0,
    EfiBoot = 1,
    MacBoot = 2,
}

impl EfiMode {
    /// Decide the mode from the boot images present under `tree`.
    pub fn detect(tree: &Path) -> Self {
        let mut mode = EfiMode::NoEfi;
        if tree.join(EFIBOOT_IMG).exists() {
            mode = EfiMode::EfiBoot;
        }
        if tree.join(MACBOOT_IMG).exists() {
            mode = EfiMode::MacBoot;
        }
        info!("Detected EFI mode: {:?}", mode);
        mode
    }
}
