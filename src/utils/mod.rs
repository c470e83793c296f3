pub mod escape;
pub mod fs;
pub mod process;

pub use escape::udev_escape;
pub use fs::ScratchTree;
pub use process::Invocation;
