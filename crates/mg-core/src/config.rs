//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for tools, limits, output ceilings, imaging, and request
//! parsing. Every section defaults sensibly so a completely empty `{}` file
//! is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::limits::RuntimeLimits;
use crate::Error;

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub limits: RuntimeLimits,
    pub ceilings: CeilingsConfig,
    pub imaging: ImagingConfig,
    pub parser: ParserConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::InvalidArgument(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.limits.max_pixels == 0 {
            warnings.push("limits.max_pixels is 0; every image will pass through untouched".into());
        }
        if self.limits.max_frames == 0 {
            warnings.push("limits.max_frames is 0; every image will pass through untouched".into());
        }

        let ceilings = [
            ("fallback_convert_bytes", self.ceilings.fallback_convert_bytes),
            ("snapshot_bytes", self.ceilings.snapshot_bytes),
            ("compress_bytes", self.ceilings.compress_bytes),
            ("transcode_bytes", self.ceilings.transcode_bytes),
        ];
        for (name, value) in ceilings {
            if value == 0 {
                warnings.push(format!("ceilings.{name} is 0; the tool can never succeed"));
            }
        }

        if self.imaging.decode_timeout_ms == 0 {
            warnings.push("imaging.decode_timeout_ms is 0; decoding is unbounded".into());
        }

        if self.parser.query_key.trim().is_empty() {
            warnings.push("parser.query_key is empty; requests cannot carry actions".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub magick_path: Option<PathBuf>,
}

/// Per-call-site stdout ceilings for external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CeilingsConfig {
    pub fallback_convert_bytes: u64,
    pub snapshot_bytes: u64,
    pub compress_bytes: u64,
    pub transcode_bytes: u64,
    /// Wall-clock budget for a single tool run. `0` disables the timeout.
    pub tool_timeout_secs: u64,
}

impl Default for CeilingsConfig {
    fn default() -> Self {
        Self {
            fallback_convert_bytes: 50 * MIB,
            snapshot_bytes: 20 * MIB,
            compress_bytes: 512 * MIB,
            transcode_bytes: 1024 * MIB,
            tool_timeout_secs: 300,
        }
    }
}

impl CeilingsConfig {
    /// `None` when the timeout is disabled.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}

/// In-process imaging settings. Applied once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    pub decode_timeout_ms: u64,
    /// Convert formats the imaging library cannot read through `magick`.
    pub fallback_convert: bool,
    /// JPEG quality used when no `quality` action is present.
    pub default_quality: u8,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            decode_timeout_ms: 10_000,
            fallback_convert: true,
            default_quality: 85,
        }
    }
}

impl ImagingConfig {
    /// `None` when decoding is unbounded.
    pub fn decode_timeout(&self) -> Option<Duration> {
        (self.decode_timeout_ms > 0).then(|| Duration::from_millis(self.decode_timeout_ms))
    }
}

/// Request parsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Query parameter carrying the action path.
    pub query_key: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            query_key: "x-process".into(),
        }
    }
}
