//! `resize`: scale by box, side, or percentage.

use async_trait::async_trait;
use image::Rgba;
use mg_core::{Error, Result};

use crate::action::Action;
use crate::context::{Intent, PipelineContext};
use crate::params::Params;

const MAX_SIDE: u32 = 16_384;

/// How a `w` x `h` box is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Largest size that fits inside the box.
    Lfit,
    /// Smallest size that covers the box.
    Mfit,
    /// Cover the box, then center-crop to it.
    Fill,
    /// Fit inside the box, then pad to it.
    Pad,
    /// Exactly the box, aspect ratio ignored.
    Fixed,
}

impl ResizeMode {
    fn parse(s: &str) -> Self {
        match s {
            "mfit" => Self::Mfit,
            "fill" => Self::Fill,
            "pad" => Self::Pad,
            "fixed" => Self::Fixed,
            _ => Self::Lfit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOptions {
    pub mode: ResizeMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub long: Option<u32>,
    pub short: Option<u32>,
    pub percent: Option<u32>,
    /// Refuse to enlarge.
    pub limit: bool,
    /// Padding color for [`ResizeMode::Pad`].
    pub color: [u8; 3],
}

/// Geometry of one resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub scaled: (u32, u32),
    /// Region kept after scaling, for `fill`.
    pub crop: Option<(u32, u32, u32, u32)>,
    /// Final canvas size, for `pad`.
    pub pad: Option<(u32, u32)>,
}

impl ResizePlan {
    /// Size of the image after the whole plan.
    pub fn output(&self) -> (u32, u32) {
        match (self.crop, self.pad) {
            (Some((_, _, w, h)), _) => (w, h),
            (_, Some(size)) => size,
            _ => self.scaled,
        }
    }

    /// Largest single-frame buffer the plan allocates: the scaled image, or
    /// the padded canvas when that is bigger.
    pub fn peak_pixels(&self) -> u64 {
        let (w, h) = self.output();
        let area = |(w, h): (u32, u32)| u64::from(w) * u64::from(h);
        area(self.scaled).max(area((w, h)))
    }

    /// Whether running the plan on `frames` frames of `src_pixels` each would
    /// grow the image past `max_pixels` in total.
    pub fn exceeds(&self, src_pixels: u64, frames: u64, max_pixels: u64) -> bool {
        let peak = self.peak_pixels();
        peak > src_pixels && peak.saturating_mul(frames.max(1)) > max_pixels
    }
}

fn scale(side: u32, factor: f64) -> u32 {
    ((f64::from(side) * factor).round() as u32).max(1)
}

impl ResizeOptions {
    /// Geometry for a `src_w` x `src_h` source, or `None` when nothing
    /// would change (same size, or an enlargement with `limit` on).
    pub fn plan(&self, src_w: u32, src_h: u32) -> Option<ResizePlan> {
        let (sw, sh) = (f64::from(src_w), f64::from(src_h));

        let mut width = self.width;
        let mut height = self.height;
        if width.is_none() && height.is_none() {
            let landscape = src_w >= src_h;
            if let Some(l) = self.long {
                if landscape { width = Some(l) } else { height = Some(l) }
            }
            if let Some(s) = self.short {
                if landscape { height = Some(s) } else { width = Some(s) }
            }
        }

        let mut crop = None;
        let mut pad = None;
        let scaled = match (self.percent, width, height) {
            (Some(p), _, _) => {
                let f = f64::from(p) / 100.0;
                (scale(src_w, f), scale(src_h, f))
            }
            (None, Some(w), None) => (w, scale(src_h, f64::from(w) / sw)),
            (None, None, Some(h)) => (scale(src_w, f64::from(h) / sh), h),
            (None, Some(w), Some(h)) => {
                let fw = f64::from(w) / sw;
                let fh = f64::from(h) / sh;
                match self.mode {
                    ResizeMode::Fixed => (w, h),
                    ResizeMode::Lfit => (scale(src_w, fw.min(fh)), scale(src_h, fw.min(fh))),
                    ResizeMode::Mfit => (scale(src_w, fw.max(fh)), scale(src_h, fw.max(fh))),
                    ResizeMode::Fill => {
                        let s = (scale(src_w, fw.max(fh)), scale(src_h, fw.max(fh)));
                        let (cw, ch) = (w.min(s.0), h.min(s.1));
                        crop = Some(((s.0 - cw) / 2, (s.1 - ch) / 2, cw, ch));
                        s
                    }
                    ResizeMode::Pad => {
                        pad = Some((w, h));
                        (scale(src_w, fw.min(fh)), scale(src_h, fw.min(fh)))
                    }
                }
            }
            (None, None, None) => return None,
        };

        let enlarging = scaled.0 > src_w || scaled.1 > src_h;
        if self.limit && enlarging {
            return None;
        }

        let plan = ResizePlan { scaled, crop, pad };
        if plan.scaled == (src_w, src_h) && plan.output() == (src_w, src_h) {
            return None;
        }
        Some(plan)
    }
}

fn parse_color(value: &str) -> Result<[u8; 3]> {
    let invalid = || Error::invalid(format!("resize: color must be RRGGBB, got {value:?}"));
    if value.len() != 6 || !value.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&value[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[derive(Debug, Default)]
pub struct ResizeAction;

#[async_trait]
impl Action for ResizeAction {
    type Options = ResizeOptions;

    fn name(&self) -> &'static str {
        "resize"
    }

    fn validate(&self, params: &[String]) -> Result<ResizeOptions> {
        let p = Params::parse(
            "resize",
            params,
            &["m", "w", "h", "l", "s", "p", "limit", "color"],
        )?;
        p.no_bare()?;

        let opts = ResizeOptions {
            mode: ResizeMode::parse(
                p.choice("m", &["lfit", "mfit", "fill", "pad", "fixed"])?
                    .unwrap_or("lfit"),
            ),
            width: p.uint("w", 1..=MAX_SIDE)?,
            height: p.uint("h", 1..=MAX_SIDE)?,
            long: p.uint("l", 1..=MAX_SIDE)?,
            short: p.uint("s", 1..=MAX_SIDE)?,
            percent: p.uint("p", 1..=1000)?,
            limit: p.flag("limit")?.unwrap_or(true),
            color: p
                .get("color")
                .map(parse_color)
                .transpose()?
                .unwrap_or([255, 255, 255]),
        };

        let sized = [opts.width, opts.height, opts.long, opts.short]
            .iter()
            .any(Option::is_some);
        if opts.percent.is_some() && sized {
            return Err(Error::invalid("resize: p cannot be combined with w, h, l or s"));
        }
        if opts.percent.is_none() && !sized {
            return Err(Error::invalid("resize: requires one of w, h, l, s or p"));
        }
        Ok(opts)
    }

    /// Skip an enlargement whose frames together would pass the pixel limit.
    fn before_process(
        &self,
        ctx: &PipelineContext,
        options: &ResizeOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        let meta = ctx.metadata()?;
        let Some(plan) = options.plan(meta.width, meta.height) else {
            return Ok(Vec::new());
        };
        if plan.exceeds(meta.pixels(), u64::from(meta.frames), ctx.limits.max_pixels) {
            tracing::debug!(index, frames = meta.frames, "Skipping enlargement past the pixel limit");
            return Ok(vec![Intent::Disable(index)]);
        }
        Ok(Vec::new())
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &ResizeOptions) -> Result<()> {
        let canvas = ctx.canvas()?;
        let Some(plan) = options.plan(canvas.width(), canvas.height()) else {
            tracing::debug!("Resize leaves the image unchanged");
            return Ok(());
        };
        // Earlier actions may have grown the canvas since `before_process`.
        let src_pixels = u64::from(canvas.width()) * u64::from(canvas.height());
        if plan.exceeds(src_pixels, canvas.frame_count() as u64, ctx.limits.max_pixels) {
            let (w, h) = plan.output();
            tracing::warn!(width = w, height = h, "Resize would pass the pixel limit, skipping");
            return Ok(());
        }
        let [r, g, b] = options.color;

        ctx.transform_canvas(move |canvas| {
            canvas.resize_exact(plan.scaled.0, plan.scaled.1);
            if let Some((x, y, w, h)) = plan.crop {
                canvas.crop(x, y, w, h);
            }
            if let Some((w, h)) = plan.pad {
                canvas.pad(w, h, Rgba([r, g, b, 255]));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::image::testing::{ctx_with, gif_ctx};
    use mg_core::ImageFormat;

    fn opts(params: &[&str]) -> Result<ResizeOptions> {
        let raw: Vec<String> = params.iter().map(|s| s.to_string()).collect();
        ResizeAction.validate(&raw)
    }

    #[test]
    fn requires_a_size() {
        assert!(matches!(opts(&[]), Err(Error::InvalidArgument(_))));
        assert!(opts(&["m_fill"]).is_err());
        assert!(opts(&["p_50", "w_10"]).is_err());
    }

    #[test]
    fn range_errors_name_the_key() {
        let err = opts(&["w_0"]).unwrap_err();
        assert!(err.to_string().contains("resize: w"));
        assert!(opts(&["w_16385"]).is_err());
        assert!(opts(&["w_16384"]).is_ok());
        assert!(opts(&["p_1001"]).is_err());
        assert!(opts(&["m_stretch", "w_1"]).is_err());
        assert!(opts(&["w_1", "color_zzzzzz"]).is_err());
        assert!(opts(&["w_1", "90"]).is_err());
    }

    #[test]
    fn validate_is_repeatable() {
        let raw = ["w_100", "h_50", "m_pad", "color_FF0000"];
        assert_eq!(opts(&raw).unwrap(), opts(&raw).unwrap());
        assert_eq!(opts(&raw).unwrap().color, [255, 0, 0]);
    }

    #[test]
    fn plan_modes() {
        let fixed = opts(&["w_100", "h_100", "m_fixed"]).unwrap();
        assert_eq!(fixed.plan(1000, 500).unwrap().output(), (100, 100));

        let lfit = opts(&["w_100", "h_100"]).unwrap();
        assert_eq!(lfit.plan(1000, 500).unwrap().output(), (100, 50));

        let mfit = opts(&["w_100", "h_100", "m_mfit"]).unwrap();
        assert_eq!(mfit.plan(1000, 500).unwrap().output(), (200, 100));

        let fill = opts(&["w_100", "h_100", "m_fill"]).unwrap();
        let plan = fill.plan(1000, 500).unwrap();
        assert_eq!(plan.scaled, (200, 100));
        assert_eq!(plan.crop, Some((50, 0, 100, 100)));

        let pad = opts(&["w_100", "h_100", "m_pad"]).unwrap();
        let plan = pad.plan(1000, 500).unwrap();
        assert_eq!(plan.scaled, (100, 50));
        assert_eq!(plan.output(), (100, 100));
    }

    #[test]
    fn plan_sides_and_percent() {
        assert_eq!(opts(&["w_100"]).unwrap().plan(1000, 500).unwrap().output(), (100, 50));
        assert_eq!(opts(&["l_200"]).unwrap().plan(500, 1000).unwrap().output(), (100, 200));
        assert_eq!(opts(&["s_100"]).unwrap().plan(1000, 500).unwrap().output(), (200, 100));
        assert_eq!(opts(&["p_10"]).unwrap().plan(1000, 500).unwrap().output(), (100, 50));
    }

    #[test]
    fn limit_blocks_enlargement() {
        assert!(opts(&["w_2000"]).unwrap().plan(1000, 500).is_none());
        let plan = opts(&["w_2000", "limit_0"]).unwrap().plan(1000, 500).unwrap();
        assert_eq!(plan.output(), (2000, 1000));
        assert!(opts(&["w_1000"]).unwrap().plan(1000, 500).is_none());
    }

    #[tokio::test]
    async fn process_resizes_canvas() {
        let mut ctx = ctx_with(&["image", "resize,w_100,h_100,m_fixed"], 1000, 500, ImageFormat::Jpeg);
        ResizeAction
            .process(&mut ctx, &opts(&["w_100", "h_100", "m_fixed"]).unwrap())
            .await
            .unwrap();
        let canvas = ctx.canvas().unwrap();
        assert_eq!((canvas.width(), canvas.height()), (100, 100));
        assert!(canvas.is_modified());
    }

    #[tokio::test]
    async fn process_pads_with_color() {
        let mut ctx = ctx_with(&["image", "resize"], 40, 20, ImageFormat::Png);
        ResizeAction
            .process(&mut ctx, &opts(&["w_20", "h_20", "m_pad", "color_0000FF"]).unwrap())
            .await
            .unwrap();
        let rgba = ctx.canvas().unwrap().first().to_rgba8();
        assert_eq!(rgba.dimensions(), (20, 20));
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn animated_enlargement_past_limit_is_disabled() {
        let mut ctx = gif_ctx(&["image", "resize,w_64,limit_0"], 8, 8, 4);
        ctx.limits = std::sync::Arc::new(mg_core::RuntimeLimits {
            max_pixels: 64 * 64,
            ..Default::default()
        });
        let o = opts(&["w_64", "limit_0"]).unwrap();
        assert_eq!(ResizeAction.before_process(&ctx, &o, 1).unwrap(), vec![Intent::Disable(1)]);

        let shrink = opts(&["w_4"]).unwrap();
        assert!(ResizeAction.before_process(&ctx, &shrink, 1).unwrap().is_empty());
    }

    #[test]
    fn still_enlargement_past_limit_is_disabled() {
        let ctx = ctx_with(&["image", "resize,w_16384,limit_0"], 1, 1000, ImageFormat::Png);
        let o = opts(&["w_16384", "limit_0"]).unwrap();
        assert_eq!(ResizeAction.before_process(&ctx, &o, 1).unwrap(), vec![Intent::Disable(1)]);

        let within = opts(&["w_10", "limit_0"]).unwrap();
        assert!(ResizeAction.before_process(&ctx, &within, 1).unwrap().is_empty());
    }

    #[test]
    fn fill_and_pad_count_their_largest_buffer() {
        // Scaling a thin strip to cover 16384x1 means a 16384x16384000 intermediate.
        let fill = opts(&["w_16384", "h_1", "m_fill", "limit_0"]).unwrap();
        let plan = fill.plan(1, 1000).unwrap();
        assert_eq!(plan.output(), (16384, 1));
        assert!(plan.exceeds(1000, 1, 100_000_000));

        let pad = opts(&["w_50", "h_16384", "m_pad"]).unwrap();
        let plan = pad.plan(100, 100).unwrap();
        assert_eq!(plan.scaled, (50, 50));
        assert_eq!(plan.peak_pixels(), 50 * 16384);
        assert!(plan.exceeds(10_000, 1, 500_000));
        assert!(!plan.exceeds(10_000, 1, 1_000_000));
    }

    #[tokio::test]
    async fn process_skips_oversized_output() {
        let mut ctx = ctx_with(&["image", "resize,w_16384,limit_0"], 1, 1000, ImageFormat::Png);
        ResizeAction
            .process(&mut ctx, &opts(&["w_16384", "limit_0"]).unwrap())
            .await
            .unwrap();
        let canvas = ctx.canvas().unwrap();
        assert_eq!((canvas.width(), canvas.height()), (1, 1000));
        assert!(!canvas.is_modified());
    }
}
