//! `format,<ext>` and `quality,q_|Q_`: output encoding settings.

use async_trait::async_trait;
use mg_core::{Error, ImageFormat, Result};

use crate::action::Action;
use crate::context::{FeatureKey, FeatureValue, Intent, PipelineContext};
use crate::params::Params;
use crate::token::ActionToken;

const FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];

#[derive(Debug, Default)]
pub struct FormatAction;

#[async_trait]
impl Action for FormatAction {
    type Options = ImageFormat;

    fn name(&self) -> &'static str {
        "format"
    }

    fn validate(&self, params: &[String]) -> Result<ImageFormat> {
        let p = Params::parse("format", params, &[])?;
        let value = p.single_bare()?;
        if !FORMATS.contains(&value) {
            return Err(Error::invalid(format!(
                "format: must be one of {}, got {value:?}",
                FORMATS.join("|")
            )));
        }
        ImageFormat::parse(value)
            .ok_or_else(|| Error::invalid(format!("format: unsupported {value:?}")))
    }

    /// Still output formats only need the first frame decoded.
    fn before_new_context(
        &self,
        _ctx: &PipelineContext,
        target: &ImageFormat,
        _index: usize,
    ) -> Result<Vec<Intent>> {
        if target.supports_animation() {
            return Ok(Vec::new());
        }
        Ok(vec![Intent::SetFeature(
            FeatureKey::Animated,
            FeatureValue::Bool(false),
        )])
    }

    fn before_process(
        &self,
        ctx: &PipelineContext,
        target: &ImageFormat,
        index: usize,
    ) -> Result<Vec<Intent>> {
        // An earlier enabled `format` decides what this position converts from.
        let source = ctx.metadata()?.format;
        let current = (1..index.min(ctx.mask.len()))
            .rev()
            .filter(|i| ctx.mask.is_enabled(*i))
            .filter_map(|i| ActionToken::parse(ctx.mask.action(i)).ok())
            .filter(|t| t.name == self.name())
            .find_map(|t| self.validate(&t.params).ok())
            .unwrap_or(source);
        if current == *target {
            tracing::debug!(index, format = %target, "Image already in target format");
            return Ok(vec![Intent::Disable(index)]);
        }
        Ok(Vec::new())
    }

    async fn process(&self, ctx: &mut PipelineContext, target: &ImageFormat) -> Result<()> {
        ctx.canvas_mut()?.set_format(*target);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// quality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityOptions {
    /// Percentage of the configured default quality (`q_`).
    Relative(u8),
    /// Exact encoder quality (`Q_`).
    Absolute(u8),
}

#[derive(Debug)]
pub struct QualityAction {
    default_quality: u8,
}

impl QualityAction {
    pub fn new(default_quality: u8) -> Self {
        Self { default_quality }
    }

    /// Encoder quality for `options`, in [1, 100].
    pub fn resolve(&self, options: QualityOptions) -> u8 {
        match options {
            QualityOptions::Absolute(q) => q,
            QualityOptions::Relative(pct) => {
                let q = u32::from(self.default_quality) * u32::from(pct) / 100;
                q.clamp(1, 100) as u8
            }
        }
    }
}

#[async_trait]
impl Action for QualityAction {
    type Options = QualityOptions;

    fn name(&self) -> &'static str {
        "quality"
    }

    fn validate(&self, params: &[String]) -> Result<QualityOptions> {
        let p = Params::parse("quality", params, &["q", "Q"])?;
        p.no_bare()?;
        let relative = p.uint("q", 1..=100)?;
        let absolute = p.uint("Q", 1..=100)?;
        match (relative, absolute) {
            (Some(q), None) => Ok(QualityOptions::Relative(q as u8)),
            (None, Some(q)) => Ok(QualityOptions::Absolute(q as u8)),
            (Some(_), Some(_)) => Err(Error::invalid("quality: q and Q are mutually exclusive")),
            (None, None) => Err(Error::invalid("quality: requires q or Q")),
        }
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &QualityOptions) -> Result<()> {
        let quality = self.resolve(*options);
        ctx.canvas_mut()?.set_quality(quality);
        Ok(())
    }
}
