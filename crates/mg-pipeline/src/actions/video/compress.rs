//! `compress`: re-encode at a constant rate factor.

use async_trait::async_trait;
use mg_av::{ffmpeg, CompressSpec};
use mg_core::{Result, VideoContainer};

use super::{supersede_earlier, VideoToolkit};
use crate::action::Action;
use crate::context::{Intent, PipelineContext};
use crate::params::Params;

const DEFAULT_CRF: u8 = 28;

pub type CompressOptions = CompressSpec;

#[derive(Debug)]
pub struct CompressAction {
    kit: VideoToolkit,
}

impl CompressAction {
    pub fn new(kit: VideoToolkit) -> Self {
        Self { kit }
    }
}

#[async_trait]
impl Action for CompressAction {
    type Options = CompressOptions;

    fn name(&self) -> &'static str {
        "compress"
    }

    fn validate(&self, params: &[String]) -> Result<CompressOptions> {
        let p = Params::parse("compress", params, &["q", "s", "f"])?;
        p.no_bare()?;
        let container = match p.choice("f", &["mp4", "webm"])? {
            Some("webm") => VideoContainer::Webm,
            _ => VideoContainer::Mp4,
        };
        Ok(CompressSpec {
            crf: p.uint("q", 0..=51)?.map_or(DEFAULT_CRF, |q| q as u8),
            short_side: p.uint("s", 64..=4096)?,
            container,
        })
    }

    fn before_process(
        &self,
        ctx: &PipelineContext,
        _options: &CompressOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(supersede_earlier(ctx, index))
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &CompressOptions) -> Result<()> {
        let cmd = ffmpeg::compress_command(
            self.kit.ffmpeg()?,
            ctx.remote_url()?,
            options,
            self.kit.ceilings().compress_bytes,
        );
        self.kit.run_into(ctx, cmd, options.container.mime_type()).await
    }
}
