//! `transcode`: convert container and codecs.

use async_trait::async_trait;
use mg_av::{ffmpeg, TranscodeSpec};
use mg_core::{AudioCodec, Error, Result, VideoCodec, VideoContainer};

use super::{supersede_earlier, VideoToolkit};
use crate::action::Action;
use crate::context::{Intent, PipelineContext};
use crate::params::Params;

pub type TranscodeOptions = TranscodeSpec;

#[derive(Debug)]
pub struct TranscodeAction {
    kit: VideoToolkit,
}

impl TranscodeAction {
    pub fn new(kit: VideoToolkit) -> Self {
        Self { kit }
    }
}

/// Codecs the WebM muxer accepts.
fn check_webm(spec: &TranscodeSpec) -> Result<()> {
    if spec.container != VideoContainer::Webm {
        return Ok(());
    }
    if !matches!(spec.video, VideoCodec::Vp9 | VideoCodec::Copy) {
        return Err(Error::invalid(format!(
            "transcode: webm cannot carry {} video",
            spec.video
        )));
    }
    if spec.audio == AudioCodec::Aac {
        return Err(Error::invalid("transcode: webm cannot carry aac audio"));
    }
    Ok(())
}

#[async_trait]
impl Action for TranscodeAction {
    type Options = TranscodeOptions;

    fn name(&self) -> &'static str {
        "transcode"
    }

    fn validate(&self, params: &[String]) -> Result<TranscodeOptions> {
        let p = Params::parse("transcode", params, &["f", "vcodec", "acodec", "br"])?;
        p.no_bare()?;

        let container = p
            .choice("f", &["mp4", "webm", "mkv", "mov"])?
            .and_then(VideoContainer::parse)
            .unwrap_or(VideoContainer::Mp4);
        let default_video = match container {
            VideoContainer::Webm => VideoCodec::Vp9,
            _ => VideoCodec::H264,
        };
        let default_audio = match container {
            VideoContainer::Webm => AudioCodec::Opus,
            _ => AudioCodec::Aac,
        };

        let spec = TranscodeSpec {
            container,
            video: p
                .choice("vcodec", &["h264", "h265", "vp9", "copy"])?
                .and_then(VideoCodec::parse)
                .unwrap_or(default_video),
            audio: p
                .choice("acodec", &["aac", "opus", "copy", "none"])?
                .and_then(AudioCodec::parse)
                .unwrap_or(default_audio),
            bitrate_kbps: p.uint("br", 64..=50_000)?,
        };
        check_webm(&spec)?;
        Ok(spec)
    }

    fn before_process(
        &self,
        ctx: &PipelineContext,
        _options: &TranscodeOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(supersede_earlier(ctx, index))
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &TranscodeOptions) -> Result<()> {
        let cmd = ffmpeg::transcode_command(
            self.kit.ffmpeg()?,
            ctx.remote_url()?,
            options,
            self.kit.ceilings().transcode_bytes,
        );
        self.kit.run_into(ctx, cmd, options.container.mime_type()).await
    }
}
