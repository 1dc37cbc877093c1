//! Runtime-tunable content limits.
//!
//! [`LimitsHandle`] is shared by every processor. Readers take a cheap
//! [`Arc`] snapshot per request; a control plane applies a [`LimitsUpdate`]
//! through [`LimitsHandle::reconfigure`], which swaps the whole struct at
//! once so a request never observes a half-applied update.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Limits checked against decoded content before any action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeLimits {
    /// Maximum `width * height` of a decodable image.
    pub max_pixels: u64,
    /// Maximum number of animation frames (pages).
    pub max_frames: u32,
    /// Maximum size of a source object in bytes.
    pub max_input_bytes: u64,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_pixels: 100_000_000,
            max_frames: 500,
            max_input_bytes: 200 * 1024 * 1024,
        }
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsUpdate {
    pub max_pixels: Option<u64>,
    pub max_frames: Option<u32>,
    pub max_input_bytes: Option<u64>,
}

/// Shared, atomically swappable [`RuntimeLimits`].
#[derive(Debug, Clone)]
pub struct LimitsHandle {
    current: Arc<RwLock<Arc<RuntimeLimits>>>,
}

impl LimitsHandle {
    /// Create a handle holding the given initial limits.
    pub fn new(limits: RuntimeLimits) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(limits))),
        }
    }

    /// Read the limits in effect right now.
    pub fn snapshot(&self) -> Arc<RuntimeLimits> {
        self.current.read().clone()
    }

    /// Apply `update` as a single swap and return the new limits.
    pub fn reconfigure(&self, update: LimitsUpdate) -> Arc<RuntimeLimits> {
        let mut guard = self.current.write();
        let mut next = **guard;
        if let Some(v) = update.max_pixels {
            next.max_pixels = v;
        }
        if let Some(v) = update.max_frames {
            next.max_frames = v;
        }
        if let Some(v) = update.max_input_bytes {
            next.max_input_bytes = v;
        }
        let next = Arc::new(next);
        *guard = next.clone();
        drop(guard);

        tracing::info!(
            max_pixels = next.max_pixels,
            max_frames = next.max_frames,
            max_input_bytes = next.max_input_bytes,
            "Runtime limits reconfigured"
        );
        next
    }
}

impl Default for LimitsHandle {
    fn default() -> Self {
        Self::new(RuntimeLimits::default())
    }
}
