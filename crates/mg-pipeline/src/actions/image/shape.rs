//! `circle` and `rounded-corners`: alpha masks.

use async_trait::async_trait;
use mg_core::{Error, Result};

use crate::action::Action;
use crate::context::PipelineContext;
use crate::params::Params;

const MAX_RADIUS: u32 = 4096;

fn radius(action: &'static str, params: &[String]) -> Result<u32> {
    let p = Params::parse(action, params, &["r"])?;
    p.no_bare()?;
    p.uint("r", 1..=MAX_RADIUS)?
        .ok_or_else(|| Error::invalid(format!("{action}: r is required")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadiusOptions {
    pub radius: u32,
}

/// Crop to the centered circle of radius `r`.
#[derive(Debug, Default)]
pub struct CircleAction;

#[async_trait]
impl Action for CircleAction {
    type Options = RadiusOptions;

    fn name(&self) -> &'static str {
        "circle"
    }

    fn validate(&self, params: &[String]) -> Result<RadiusOptions> {
        Ok(RadiusOptions {
            radius: radius("circle", params)?,
        })
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &RadiusOptions) -> Result<()> {
        let r = options.radius;
        ctx.transform_canvas(move |c| {
            c.circle(r);
            Ok(())
        })
        .await
    }
}

/// Round the corners with radius `r`.
#[derive(Debug, Default)]
pub struct RoundedCornersAction;

#[async_trait]
impl Action for RoundedCornersAction {
    type Options = RadiusOptions;

    fn name(&self) -> &'static str {
        "rounded-corners"
    }

    fn validate(&self, params: &[String]) -> Result<RadiusOptions> {
        Ok(RadiusOptions {
            radius: radius("rounded-corners", params)?,
        })
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &RadiusOptions) -> Result<()> {
        let r = options.radius;
        ctx.transform_canvas(move |c| {
            c.round_corners(r);
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
    fn radius_range() {
        let err = RoundedCornersAction.validate(&raw(&["r_9999"])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("rounded-corners: r"));
        assert!(RoundedCornersAction.validate(&raw(&["r_0"])).is_err());
        assert!(RoundedCornersAction.validate(&raw(&[])).is_err());
        assert_eq!(CircleAction.validate(&raw(&["r_4096"])).unwrap().radius, 4096);
    }

    #[tokio::test]
    async fn circle_output_is_square() {
        let mut ctx = ctx_with(&["image", "circle,r_10"], 60, 40, ImageFormat::Png);
        CircleAction
            .process(&mut ctx, &RadiusOptions { radius: 10 })
            .await
            .unwrap();
        let c = ctx.canvas().unwrap();
        assert_eq!((c.width(), c.height()), (20, 20));
    }

    #[tokio::test]
    async fn rounded_corners_clear_corner_alpha() {
        let mut ctx = ctx_with(&["image", "rounded-corners,r_8"], 32, 32, ImageFormat::Png);
        RoundedCornersAction
            .process(&mut ctx, &RadiusOptions { radius: 8 })
            .await
            .unwrap();
        let rgba = ctx.canvas().unwrap().first().to_rgba8();
        assert_eq!(rgba.get_pixel(0, 31)[3], 0);
        assert_eq!(rgba.get_pixel(16, 16)[3], 255);
    }
}
