//! Actions of the `video` processor.
//!
//! Each action produces the whole response by running ffmpeg against the
//! source URL, so at most one of them can meaningfully run per request.

mod compress;
mod snapshot;
mod transcode;

pub use compress::{CompressAction, CompressOptions};
pub use snapshot::{SnapshotAction, SnapshotOptions};
pub use transcode::{TranscodeAction, TranscodeOptions};

use std::path::Path;
use std::sync::Arc;

use mg_av::{BoundedCommand, ToolRegistry};
use mg_core::config::CeilingsConfig;
use mg_core::Result;

use crate::context::{Intent, PipelineContext, ProcessOutcome};
use crate::registry::ActionRegistry;
use crate::token::ActionToken;

/// Names of actions that write the full video response.
const OUTPUT_ACTIONS: &[&str] = &["snapshot", "compress", "transcode"];

/// Tool paths and ceilings shared by the video actions.
#[derive(Debug, Clone)]
pub struct VideoToolkit {
    tools: Arc<ToolRegistry>,
    ceilings: CeilingsConfig,
}

impl VideoToolkit {
    pub fn new(tools: Arc<ToolRegistry>, ceilings: CeilingsConfig) -> Self {
        Self { tools, ceilings }
    }

    pub fn ceilings(&self) -> &CeilingsConfig {
        &self.ceilings
    }

    fn ffmpeg(&self) -> Result<&Path> {
        Ok(self.tools.require("ffmpeg")?.path.as_path())
    }

    /// Run `cmd` and store its stdout as the request result.
    async fn run_into(
        &self,
        ctx: &mut PipelineContext,
        cmd: BoundedCommand,
        content_type: &str,
    ) -> Result<()> {
        let cmd = cmd.timeout(self.ceilings.tool_timeout());
        tracing::debug!(uri = %ctx.uri, ceiling = cmd.ceiling(), "Running ffmpeg");
        let payload = cmd.execute().await?;
        tracing::info!(uri = %ctx.uri, bytes = payload.len(), "ffmpeg finished");
        ctx.result = Some(ProcessOutcome::new(payload, content_type));
        Ok(())
    }
}

/// Every built-in video action.
pub fn registry(tools: Arc<ToolRegistry>, ceilings: &CeilingsConfig) -> ActionRegistry {
    let kit = VideoToolkit::new(tools, ceilings.clone());
    ActionRegistry::new()
        .with(SnapshotAction::new(kit.clone()))
        .with(CompressAction::new(kit.clone()))
        .with(TranscodeAction::new(kit))
}

/// Disable every earlier output action, so only the last one runs.
pub(crate) fn supersede_earlier(ctx: &PipelineContext, index: usize) -> Vec<Intent> {
    (1..index.min(ctx.mask.len()))
        .filter(|i| ctx.mask.is_enabled(*i))
        .filter(|i| {
            ActionToken::parse(ctx.mask.action(*i))
                .map(|t| OUTPUT_ACTIONS.contains(&t.name.as_str()))
                .unwrap_or(false)
        })
        .map(Intent::Disable)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;
    use std::sync::Arc;

    use mg_av::ToolRegistry;
    use mg_core::RuntimeLimits;

    use crate::context::{PipelineContext, SourceHandle};
    use crate::store::MemoryContentStore;

    pub(crate) fn raw(params: &[&str]) -> Vec<String> {
        params.iter().map(|s| s.to_string()).collect()
    }

    /// Context whose source is a remote URL.
    pub(crate) fn video_ctx(tokens: &[&str]) -> PipelineContext {
        let mut ctx = PipelineContext::new(
            "clip.mp4",
            raw(tokens),
            Arc::new(MemoryContentStore::new()),
            Arc::new(RuntimeLimits::default()),
        );
        ctx.source = Some(SourceHandle::Remote {
            url: "https://media.example/clip.mp4".into(),
        });
        ctx
    }

    /// A shell script standing in for ffmpeg.
    #[cfg(unix)]
    pub(crate) fn fake_ffmpeg(dir: &std::path::Path, body: &str) -> Arc<ToolRegistry> {
        use std::os::unix::fs::PermissionsExt;

        let path: PathBuf = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Arc::new(ToolRegistry::with_tools([("ffmpeg".to_string(), path)]))
    }
}
