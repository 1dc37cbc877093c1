//! Locating the external programs mediagate shells out to.
//!
//! A [`ToolRegistry`] is built once at start-up, either by searching for
//! every [`KnownTool`] ([`ToolRegistry::discover`]) or from explicit paths
//! ([`ToolRegistry::with_tools`]), and is then shared read-only by the
//! processors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use mg_core::config::ToolsConfig;
use mg_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A program some call site may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownTool {
    /// Video snapshot, compress and transcode.
    Ffmpeg,
    Ffprobe,
    /// Fallback conversion of still images the decoder cannot read.
    Magick,
}

impl KnownTool {
    pub const ALL: [KnownTool; 3] = [KnownTool::Ffmpeg, KnownTool::Ffprobe, KnownTool::Magick];

    /// Executable name searched for on `PATH`.
    pub fn name(self) -> &'static str {
        match self {
            KnownTool::Ffmpeg => "ffmpeg",
            KnownTool::Ffprobe => "ffprobe",
            KnownTool::Magick => "magick",
        }
    }

    // The ffmpeg family takes a single dash.
    fn version_flag(self) -> &'static str {
        match self {
            KnownTool::Ffmpeg | KnownTool::Ffprobe => "-version",
            KnownTool::Magick => "--version",
        }
    }

    fn configured(self, config: &ToolsConfig) -> Option<&Path> {
        match self {
            KnownTool::Ffmpeg => config.ffmpeg_path.as_deref(),
            KnownTool::Ffprobe => config.ffprobe_path.as_deref(),
            KnownTool::Magick => config.magick_path.as_deref(),
        }
    }
}

impl fmt::Display for KnownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a tool's path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    /// An override from `tools.*_path` in the configuration.
    Configured,
    /// Found by searching `PATH`.
    SearchPath,
    /// Handed to [`ToolRegistry::with_tools`].
    Explicit,
}

impl fmt::Display for ToolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolOrigin::Configured => "configured",
            ToolOrigin::SearchPath => "PATH",
            ToolOrigin::Explicit => "explicit",
        })
    }
}

/// A tool that was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedTool {
    pub name: String,
    pub path: PathBuf,
    pub origin: ToolOrigin,
}

/// One row of [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    /// First line the tool printed for its version flag.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub origin: Option<ToolOrigin>,
}

/// Tool paths keyed by executable name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    located: BTreeMap<String, LocatedTool>,
}

impl ToolRegistry {
    /// Locate every [`KnownTool`].
    ///
    /// A configured path is used when it exists; otherwise (or when it is
    /// stale) the tool is looked up on `PATH`. Tools found neither way are
    /// left out and reported by [`require`](Self::require).
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut located = BTreeMap::new();

        for tool in KnownTool::ALL {
            let found = match tool.configured(config) {
                Some(path) if path.exists() => Some((path.to_path_buf(), ToolOrigin::Configured)),
                Some(path) => {
                    tracing::warn!(
                        tool = tool.name(),
                        path = %path.display(),
                        "Configured tool path does not exist, searching PATH"
                    );
                    which::which(tool.name()).ok().map(|p| (p, ToolOrigin::SearchPath))
                }
                None => which::which(tool.name()).ok().map(|p| (p, ToolOrigin::SearchPath)),
            };

            match found {
                Some((path, origin)) => {
                    tracing::debug!(tool = tool.name(), path = %path.display(), %origin, "Located tool");
                    located.insert(
                        tool.name().to_string(),
                        LocatedTool {
                            name: tool.name().to_string(),
                            path,
                            origin,
                        },
                    );
                }
                None => tracing::debug!(tool = tool.name(), "Tool not found"),
            }
        }

        Self { located }
    }

    /// A registry of exactly `entries`, without any search.
    pub fn with_tools(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let located = entries
            .into_iter()
            .map(|(name, path)| {
                let tool = LocatedTool {
                    name: name.clone(),
                    path,
                    origin: ToolOrigin::Explicit,
                };
                (name, tool)
            })
            .collect();
        Self { located }
    }

    /// The located tool, or [`Error::Tool`] naming what is missing.
    pub fn require(&self, name: &str) -> Result<&LocatedTool> {
        self.located
            .get(name)
            .ok_or_else(|| Error::tool(name, format!("{name} is not installed or not on PATH")))
    }

    pub fn has(&self, name: &str) -> bool {
        self.located.contains_key(name)
    }

    /// Availability of every [`KnownTool`], probing versions of the ones found.
    pub fn check_all(&self) -> Vec<ToolStatus> {
        KnownTool::ALL
            .into_iter()
            .map(|tool| match self.located.get(tool.name()) {
                Some(found) => ToolStatus {
                    name: tool.name().to_string(),
                    available: true,
                    version: probe_version(tool, &found.path),
                    path: Some(found.path.clone()),
                    origin: Some(found.origin),
                },
                None => ToolStatus {
                    name: tool.name().to_string(),
                    available: false,
                    version: None,
                    path: None,
                    origin: None,
                },
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatedTool> {
        self.located.values()
    }
}

fn probe_version(tool: KnownTool, path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg(tool.version_flag())
        .output()
        .ok()?;
    if !output.status.success() {
        tracing::debug!(%tool, status = %output.status, "Version probe failed");
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_never_panics() {
        let registry = ToolRegistry::discover(&ToolsConfig::default());
        assert!(registry.iter().all(|t| t.origin == ToolOrigin::SearchPath));
    }

    #[test]
    fn missing_tool_is_a_tool_error() {
        let err = ToolRegistry::default().require("ffmpeg").unwrap_err();
        assert!(matches!(err, Error::Tool(_)));
        assert!(err.to_string().contains("not installed"));
    }

    #[test]
    fn existing_configured_path_is_used() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let config = ToolsConfig {
            magick_path: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&config);
        let magick = registry.require("magick").unwrap();
        assert_eq!(magick.path, tmp.path());
        assert_eq!(magick.origin, ToolOrigin::Configured);
    }

    #[test]
    fn stale_configured_path_is_not_used() {
        let config = ToolsConfig {
            ffprobe_path: Some(PathBuf::from("/nonexistent/mediagate/ffprobe")),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&config);
        if let Ok(found) = registry.require("ffprobe") {
            assert_eq!(found.origin, ToolOrigin::SearchPath);
        }
    }

    #[test]
    fn explicit_tools() {
        let registry = ToolRegistry::with_tools([("ffmpeg".to_string(), PathBuf::from("/opt/ffmpeg"))]);
        assert!(registry.has("ffmpeg"));
        assert!(!registry.has("magick"));
        let ffmpeg = registry.require("ffmpeg").unwrap();
        assert_eq!(ffmpeg.origin, ToolOrigin::Explicit);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn check_all_lists_known_tools_in_order() {
        let statuses = ToolRegistry::default().check_all();
        let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe", "magick"]);
        assert!(statuses.iter().all(|s| !s.available && s.origin.is_none()));
    }

    #[cfg(unix)]
    #[test]
    fn version_is_first_line_of_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("magick");
        std::fs::write(&script, "#!/bin/sh\necho \"Version: 7.1 $1\"\necho second\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = ToolRegistry::with_tools([("magick".to_string(), script)]);
        let magick = registry
            .check_all()
            .into_iter()
            .find(|s| s.name == "magick")
            .unwrap();
        assert_eq!(magick.version.as_deref(), Some("Version: 7.1 --version"));
    }

    #[test]
    fn origin_serializes_snake_case() {
        let json = serde_json::to_string(&ToolOrigin::SearchPath).unwrap();
        assert_eq!(json, "\"search_path\"");
        assert_eq!(KnownTool::Magick.to_string(), "magick");
    }
}
