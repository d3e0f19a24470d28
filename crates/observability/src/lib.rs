//! Process-wide tracing setup.

pub mod tracing;

pub use tracing::init_tracing;
