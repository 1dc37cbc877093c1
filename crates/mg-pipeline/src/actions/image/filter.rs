//! Pixel filters: `blur`, `bright`, `contrast`, `sharpen`.

use async_trait::async_trait;
use mg_core::{Error, Result};

use crate::action::Action;
use crate::context::PipelineContext;
use crate::params::{parse_in_range, Params};

// ---------------------------------------------------------------------------
// blur
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurOptions {
    pub sigma: f32,
}

/// Gaussian blur. `s` is the standard deviation; without it, half the
/// radius `r` is used.
#[derive(Debug, Default)]
pub struct BlurAction;

#[async_trait]
impl Action for BlurAction {
    type Options = BlurOptions;

    fn name(&self) -> &'static str {
        "blur"
    }

    fn validate(&self, params: &[String]) -> Result<BlurOptions> {
        let p = Params::parse("blur", params, &["r", "s"])?;
        p.no_bare()?;
        let radius = p.uint("r", 1..=50)?;
        let sigma = p.uint("s", 1..=50)?;
        let sigma = match (sigma, radius) {
            (Some(s), _) => s as f32,
            (None, Some(r)) => (r as f32 / 2.0).max(0.5),
            (None, None) => return Err(Error::invalid("blur: requires r or s")),
        };
        Ok(BlurOptions { sigma })
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &BlurOptions) -> Result<()> {
        let sigma = options.sigma;
        ctx.transform_canvas(move |c| {
            c.blur(sigma);
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// bright / contrast / sharpen
// ---------------------------------------------------------------------------

fn single_value(action: &'static str, params: &[String], range: std::ops::RangeInclusive<i32>) -> Result<i32> {
    let p = Params::parse(action, params, &[])?;
    parse_in_range(action, "value", p.single_bare()?, &range)
}

/// Amount of an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount(pub i32);

/// `bright,<-100..100>`
#[derive(Debug, Default)]
pub struct BrightAction;

#[async_trait]
impl Action for BrightAction {
    type Options = Amount;

    fn name(&self) -> &'static str {
        "bright"
    }

    fn validate(&self, params: &[String]) -> Result<Amount> {
        single_value("bright", params, -100..=100).map(Amount)
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &Amount) -> Result<()> {
        let Amount(v) = *options;
        if v == 0 {
            return Ok(());
        }
        ctx.transform_canvas(move |c| {
            c.brighten(v);
            Ok(())
        })
        .await
    }
}

/// `contrast,<-100..100>`
#[derive(Debug, Default)]
pub struct ContrastAction;

#[async_trait]
impl Action for ContrastAction {
    type Options = Amount;

    fn name(&self) -> &'static str {
        "contrast"
    }

    fn validate(&self, params: &[String]) -> Result<Amount> {
        single_value("contrast", params, -100..=100).map(Amount)
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &Amount) -> Result<()> {
        let Amount(v) = *options;
        if v == 0 {
            return Ok(());
        }
        ctx.transform_canvas(move |c| {
            c.contrast(v as f32);
            Ok(())
        })
        .await
    }
}

/// `sharpen,<50..399>`; the value is the unsharp-mask sigma in hundredths.
#[derive(Debug, Default)]
pub struct SharpenAction;

#[async_trait]
impl Action for SharpenAction {
    type Options = Amount;

    fn name(&self) -> &'static str {
        "sharpen"
    }

    fn validate(&self, params: &[String]) -> Result<Amount> {
        single_value("sharpen", params, 50..=399).map(Amount)
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &Amount) -> Result<()> {
        let sigma = options.0 as f32 / 100.0;
        ctx.transform_canvas(move |c| {
            c.sharpen(sigma, 1);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::image::testing::{ctx_with, raw};
    use mg_core::ImageFormat;

    #[test]
    fn blur_sigma_selection() {
        assert_eq!(BlurAction.validate(&raw(&["s_3"])).unwrap().sigma, 3.0);
        assert_eq!(BlurAction.validate(&raw(&["r_10"])).unwrap().sigma, 5.0);
        assert_eq!(BlurAction.validate(&raw(&["r_1", "s_2"])).unwrap().sigma, 2.0);
        assert!(BlurAction.validate(&raw(&[])).is_err());
        assert!(BlurAction.validate(&raw(&["r_51"])).is_err());
    }

    #[test]
    fn bare_value_ranges() {
        assert_eq!(BrightAction.validate(&raw(&["-100"])).unwrap(), Amount(-100));
        assert!(BrightAction.validate(&raw(&["101"])).is_err());
        assert!(ContrastAction.validate(&raw(&["x"])).is_err());
        assert!(SharpenAction.validate(&raw(&["49"])).is_err());
        assert_eq!(SharpenAction.validate(&raw(&["399"])).unwrap(), Amount(399));
        assert!(SharpenAction.validate(&raw(&["100", "200"])).is_err());
    }

    #[tokio::test]
    async fn bright_changes_pixels() {
        let mut ctx = ctx_with(&["image", "bright,50"], 4, 4, ImageFormat::Png);
        let before = ctx.canvas().unwrap().first().to_rgba8().get_pixel(0, 0)[1];
        BrightAction.process(&mut ctx, &Amount(50)).await.unwrap();
        let after = ctx.canvas().unwrap().first().to_rgba8().get_pixel(0, 0)[1];
        assert!(after > before);
    }

    #[tokio::test]
    async fn zero_adjustment_leaves_canvas_untouched() {
        let mut ctx = ctx_with(&["image", "contrast,0"], 4, 4, ImageFormat::Png);
        ContrastAction.process(&mut ctx, &Amount(0)).await.unwrap();
        assert!(!ctx.canvas().unwrap().is_modified());
    }

    #[tokio::test]
    async fn blur_and_sharpen_keep_size() {
        let mut ctx = ctx_with(&["image", "blur,s_2", "sharpen,100"], 16, 8, ImageFormat::Png);
        BlurAction.process(&mut ctx, &BlurOptions { sigma: 2.0 }).await.unwrap();
        SharpenAction.process(&mut ctx, &Amount(100)).await.unwrap();
        let c = ctx.canvas().unwrap();
        assert_eq!((c.width(), c.height()), (16, 8));
    }
}
