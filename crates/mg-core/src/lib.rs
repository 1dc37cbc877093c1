//! mg-core: shared errors, configuration, runtime limits, and media enums.
//!
//! This crate is the foundational dependency for all other mg-* crates,
//! providing the unified error taxonomy, the start-up [`config::Config`],
//! the atomically reconfigurable [`limits::LimitsHandle`], and media-domain
//! enums.

pub mod config;
pub mod error;
pub mod limits;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, ToolFailure};
pub use limits::{LimitsHandle, LimitsUpdate, RuntimeLimits};
pub use media::*;
