//! `watermark`: composite another stored image on top.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use mg_core::config::ImagingConfig;
use mg_core::{Error, Result};

use crate::action::Action;
use crate::context::PipelineContext;
use crate::imaging::{self, DecodeOptions};
use crate::params::{Gravity, Params};

/// URL-safe base64 that accepts keys with or without padding.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkOptions {
    /// Object key of the mark.
    pub key: String,
    /// Opacity percentage.
    pub opacity: u8,
    pub gravity: Gravity,
    pub x: u32,
    pub y: u32,
}

fn decode_key(encoded: &str) -> Result<String> {
    let bytes = KEY_ENGINE
        .decode(encoded)
        .map_err(|e| Error::invalid(format!("watermark: image is not base64url: {e}")))?;
    let key = String::from_utf8(bytes)
        .map_err(|_| Error::invalid("watermark: image key is not utf-8"))?;
    if key.is_empty() {
        return Err(Error::invalid("watermark: image key is empty"));
    }
    Ok(key)
}

/// Marks come from the store, so they get the same byte, pixel and decode
/// time bounds as a source image.
#[derive(Debug)]
pub struct WatermarkAction {
    decode_timeout: Option<Duration>,
}

impl WatermarkAction {
    pub fn new(decode_timeout: Option<Duration>) -> Self {
        Self { decode_timeout }
    }
}

impl Default for WatermarkAction {
    fn default() -> Self {
        Self::new(ImagingConfig::default().decode_timeout())
    }
}

#[async_trait]
impl Action for WatermarkAction {
    type Options = WatermarkOptions;

    fn name(&self) -> &'static str {
        "watermark"
    }

    fn validate(&self, params: &[String]) -> Result<WatermarkOptions> {
        let p = Params::parse("watermark", params, &["image", "t", "g", "x", "y"])?;
        p.no_bare()?;
        let key = p
            .get("image")
            .ok_or_else(|| Error::invalid("watermark: image is required"))
            .and_then(decode_key)?;
        Ok(WatermarkOptions {
            key,
            opacity: p.uint("t", 0..=100)?.unwrap_or(100) as u8,
            gravity: p.gravity("g")?.unwrap_or(Gravity::SouthEast),
            x: p.uint("x", 0..=4096)?.unwrap_or(10),
            y: p.uint("y", 0..=4096)?.unwrap_or(10),
        })
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &WatermarkOptions) -> Result<()> {
        let mark = ctx.store.get(&options.key).await?;
        let limits = Arc::clone(&ctx.limits);

        if mark.bytes.len() as u64 > limits.max_input_bytes {
            return Err(Error::invalid(format!(
                "watermark: {} is {} bytes, limit is {}",
                options.key,
                mark.bytes.len(),
                limits.max_input_bytes
            )));
        }
        let header = imaging::probe(&mark.bytes)?;
        let pixels = u64::from(header.width) * u64::from(header.height);
        if pixels > limits.max_pixels {
            return Err(Error::invalid(format!(
                "watermark: {} is {}x{}, pixel limit is {}",
                options.key, header.width, header.height, limits.max_pixels
            )));
        }

        let bytes = mark.bytes;
        let opacity = options.opacity;
        let decode = ctx.jobs.run(move || {
            let decoded = imaging::decode(
                &bytes,
                DecodeOptions {
                    animated: false,
                    max_frames: 1,
                },
            )?;
            let mut mark = decoded.first().to_rgba8();
            imaging::fade(&mut mark, opacity);
            Ok(mark)
        });
        let mark = match self.decode_timeout {
            Some(timeout) => tokio::time::timeout(timeout, decode)
                .await
                .map_err(|_| Error::Timeout {
                    operation: "watermark decode".into(),
                    after: timeout,
                })??,
            None => decode.await?,
        };

        let options = options.clone();
        ctx.transform_canvas(move |canvas| {
            let (x, y) = options.gravity.place(
                (canvas.width(), canvas.height()),
                mark.dimensions(),
                (options.x, options.y),
            );
            canvas.overlay(&mark, x, y);
            Ok(())
        })
        .await
    }
}
