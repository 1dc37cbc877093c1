use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mg_av::{convert, ToolRegistry};
use mg_core::config::{CeilingsConfig, Config, ImagingConfig};
use mg_core::{Error, Result};

use super::{finalize_headers, Processor};
use crate::actions;
use crate::context::{FeatureKey, MediaMetadata, PipelineContext, ProcessOutcome, SourceHandle};
use crate::imaging::{self, DecodeOptions, JobCounter, Probe};
use crate::registry::ActionRegistry;

/// Still and animated images, decoded in process.
pub struct ImageProcessor {
    actions: ActionRegistry,
    imaging: ImagingConfig,
    ceilings: CeilingsConfig,
    tools: Arc<ToolRegistry>,
    jobs: JobCounter,
}

impl ImageProcessor {
    pub const NAME: &'static str = "image";

    pub fn new(config: &Config, tools: Arc<ToolRegistry>) -> Self {
        Self {
            actions: actions::image::registry(&config.imaging),
            imaging: config.imaging.clone(),
            ceilings: config.ceilings.clone(),
            tools,
            jobs: JobCounter::default(),
        }
    }

    /// Imaging jobs submitted and not yet finished, for admission control.
    pub fn queue_depth(&self) -> usize {
        self.jobs.depth()
    }

    /// Probe `bytes`, converting through `magick` when the format is not
    /// readable in process. Returns the probe and the decodable bytes.
    async fn identify(&self, bytes: Bytes) -> Result<(Probe, Bytes)> {
        match imaging::probe(&bytes) {
            Ok(probe) => Ok((probe, bytes)),
            Err(Error::Decode(reason)) if self.imaging.fallback_convert && self.tools.has("magick") => {
                tracing::debug!(%reason, "Unreadable source, converting through magick");
                let magick = self.tools.require("magick")?;
                let png = convert::to_png(
                    &magick.path,
                    bytes,
                    self.ceilings.fallback_convert_bytes,
                    self.ceilings.tool_timeout(),
                )
                .await?;
                Ok((imaging::probe(&png)?, png))
            }
            Err(e) => Err(e),
        }
    }

    fn decode_options(ctx: &PipelineContext) -> DecodeOptions {
        // One past the limit so an over-long animation is detectable.
        let mut max_frames = u64::from(ctx.limits.max_frames) + 1;
        if let Some(requested) = ctx.features.number(FeatureKey::MaxFrames) {
            max_frames = max_frames.min(requested.max(1));
        }
        DecodeOptions {
            animated: ctx.features.bool(FeatureKey::Animated).unwrap_or(true),
            max_frames: u32::try_from(max_frames).unwrap_or(u32::MAX),
        }
    }
}

#[async_trait]
impl Processor for ImageProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    async fn new_context(&self, ctx: &mut PipelineContext) -> Result<()> {
        ctx.jobs = self.jobs.clone();
        let limits = Arc::clone(&ctx.limits);

        let object = ctx.store.get(&ctx.uri).await?;
        let byte_size = object.bytes.len() as u64;
        if byte_size > limits.max_input_bytes {
            tracing::warn!(
                uri = %ctx.uri,
                byte_size,
                max_input_bytes = limits.max_input_bytes,
                "Source larger than input limit, passing through"
            );
            ctx.mask.disable_all();
            ctx.source = Some(SourceHandle::Buffered(object));
            return Ok(());
        }

        let (probe, decodable) = self.identify(object.bytes.clone()).await?;
        ctx.source = Some(SourceHandle::Buffered(object));
        let mut metadata = MediaMetadata {
            format: probe.format,
            width: probe.width,
            height: probe.height,
            frames: 1,
            byte_size,
        };

        if metadata.pixels() > limits.max_pixels {
            tracing::warn!(
                uri = %ctx.uri,
                width = metadata.width,
                height = metadata.height,
                max_pixels = limits.max_pixels,
                "Source exceeds pixel limit, passing through"
            );
            ctx.mask.disable_all();
            ctx.metadata = Some(metadata);
            return Ok(());
        }

        if !ctx.mask.any_action_enabled() {
            tracing::debug!(uri = %ctx.uri, "No enabled actions, skipping decode");
            ctx.metadata = Some(metadata);
            return Ok(());
        }

        let options = Self::decode_options(ctx);
        let decode = self
            .jobs
            .run(move || imaging::decode(&decodable, options));
        let canvas = match self.imaging.decode_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, decode)
                .await
                .map_err(|_| Error::Timeout {
                    operation: "decode".into(),
                    after: timeout,
                })??,
            None => decode.await?,
        };

        metadata.frames = canvas.frame_count() as u32;
        if metadata.frames > limits.max_frames {
            tracing::warn!(
                uri = %ctx.uri,
                max_frames = limits.max_frames,
                "Source exceeds frame limit, passing through"
            );
            ctx.mask.disable_all();
            ctx.metadata = Some(metadata);
            return Ok(());
        }

        tracing::debug!(
            uri = %ctx.uri,
            format = %metadata.format,
            width = metadata.width,
            height = metadata.height,
            frames = metadata.frames,
            "Decoded source"
        );
        ctx.metadata = Some(metadata);
        ctx.canvas = Some(canvas);
        Ok(())
    }

    async fn finish(&self, ctx: &mut PipelineContext) -> Result<ProcessOutcome> {
        let source = ctx
            .buffered_source()
            .cloned()
            .ok_or_else(|| Error::Internal("image source was never loaded".into()))?;

        if let Some(result) = ctx.result.take() {
            return Ok(finalize_headers(ctx, result));
        }

        let outcome = match ctx.canvas.take() {
            Some(canvas) if canvas.is_modified() => {
                let format = canvas.format();
                let quality = self.imaging.default_quality;
                let payload = self.jobs.run(move || canvas.encode(quality)).await?;
                let mut outcome = ProcessOutcome::new(payload, format.mime_type());
                outcome.headers = source.headers.clone();
                outcome.headers.remove("content-length");
                outcome
            }
            _ => ProcessOutcome::passthrough(&source),
        };
        Ok(finalize_headers(ctx, outcome))
    }
}
