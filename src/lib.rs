//! mediagate - media transformation gateway
//!
//! This library crate wires the engine crates together for the CLI and for
//! integration testing.

pub mod stores;

use std::sync::Arc;

use mg_av::ToolRegistry;
use mg_core::config::Config;
use mg_core::LimitsHandle;
use mg_pipeline::{ContentStore, Dispatcher, ProcessorRegistry, StyleResolver, StyleStore};

/// Build a dispatcher with the built-in image and video processors.
pub fn build_dispatcher(
    config: &Config,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ContentStore>,
    styles: Arc<dyn StyleStore>,
) -> Dispatcher {
    Dispatcher::new(
        ProcessorRegistry::from_config(config, tools),
        StyleResolver::new(styles),
        store,
        LimitsHandle::new(config.limits),
    )
}
