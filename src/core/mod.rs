pub mod builder;
pub mod probe;

pub use builder::Builder;
pub use probe::{Probe, Requirements, Unavailable};
