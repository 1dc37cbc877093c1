//! `snapshot`: extract one frame as a still image.

use async_trait::async_trait;
use mg_av::{ffmpeg, SnapshotSpec};
use mg_core::{ImageFormat, Result};

use super::{supersede_earlier, VideoToolkit};
use crate::action::Action;
use crate::context::{Intent, PipelineContext};
use crate::params::Params;

pub type SnapshotOptions = SnapshotSpec;

#[derive(Debug)]
pub struct SnapshotAction {
    kit: VideoToolkit,
}

impl SnapshotAction {
    pub fn new(kit: VideoToolkit) -> Self {
        Self { kit }
    }
}

#[async_trait]
impl Action for SnapshotAction {
    type Options = SnapshotOptions;

    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn validate(&self, params: &[String]) -> Result<SnapshotOptions> {
        let p = Params::parse("snapshot", params, &["t", "w", "h", "f", "m"])?;
        p.no_bare()?;
        let time_ms = p.int("t", 0..=86_400_000)?.unwrap_or(0) as u64;
        let format = match p.choice("f", &["jpg", "png"])? {
            Some("png") => ImageFormat::Png,
            _ => ImageFormat::Jpeg,
        };
        Ok(SnapshotSpec {
            time_ms,
            width: p.uint("w", 0..=4096)?.unwrap_or(0),
            height: p.uint("h", 0..=4096)?.unwrap_or(0),
            format,
            fast: p.choice("m", &["fast"])?.is_some(),
        })
    }

    fn before_process(
        &self,
        ctx: &PipelineContext,
        _options: &SnapshotOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(supersede_earlier(ctx, index))
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &SnapshotOptions) -> Result<()> {
        let cmd = ffmpeg::snapshot_command(
            self.kit.ffmpeg()?,
            ctx.remote_url()?,
            options,
            self.kit.ceilings().snapshot_bytes,
        );
        self.kit.run_into(ctx, cmd, options.format.mime_type()).await
    }
}
