//! Add a kickstart to an existing installer ISO.
//!
//! The source ISO is mounted, its tree copied to a scratch area, and every
//! boot config the media ships (isolinux, EFI grub, PowerPC grub, S390
//! parameter file) is patched to pass `inst.ks=hd:LABEL=<label>:/<ks>` to
//! the installer. EFI boot images are rebuilt from the edited tree, and the
//! result is mastered with whichever of xorrisofs or mkisofs the host has.

pub mod config;
pub mod core;
pub mod error;
pub mod iso;
pub mod utils;

pub use crate::config::Options;
pub use crate::core::Builder;
pub use crate::error::{Error, Result};
pub use crate::iso::EfiMode;
