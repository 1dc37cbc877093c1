//! `crop`: cut a region anchored by gravity.

use async_trait::async_trait;
use mg_core::{Error, Result};

use crate::action::Action;
use crate::context::PipelineContext;
use crate::params::{Gravity, Params};

const MAX_SIDE: u32 = 16_384;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropOptions {
    pub x: u32,
    pub y: u32,
    /// `0` means "to the edge".
    pub width: u32,
    /// `0` means "to the edge".
    pub height: u32,
    pub gravity: Gravity,
}

impl CropOptions {
    /// Region `(x, y, w, h)` inside a `src_w` x `src_h` image.
    ///
    /// The requested box is clipped to the image; a box that misses the
    /// image entirely is an error.
    pub fn region(&self, src_w: u32, src_h: u32) -> Result<(u32, u32, u32, u32)> {
        let w = if self.width == 0 { src_w } else { self.width };
        let h = if self.height == 0 { src_h } else { self.height };
        let (px, py) = self.gravity.place((src_w, src_h), (w, h), (self.x, self.y));

        let x0 = px.max(0);
        let y0 = py.max(0);
        let x1 = (px + i64::from(w)).min(i64::from(src_w));
        let y1 = (py + i64::from(h)).min(i64::from(src_h));
        if x1 <= x0 || y1 <= y0 {
            return Err(Error::invalid(format!(
                "crop: region {w}x{h}+{}+{} lies outside the {src_w}x{src_h} image",
                self.x, self.y
            )));
        }
        Ok((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

#[derive(Debug, Default)]
pub struct CropAction;

#[async_trait]
impl Action for CropAction {
    type Options = CropOptions;

    fn name(&self) -> &'static str {
        "crop"
    }

    fn validate(&self, params: &[String]) -> Result<CropOptions> {
        let p = Params::parse("crop", params, &["w", "h", "x", "y", "g"])?;
        p.no_bare()?;
        Ok(CropOptions {
            x: p.uint("x", 0..=MAX_SIDE)?.unwrap_or(0),
            y: p.uint("y", 0..=MAX_SIDE)?.unwrap_or(0),
            width: p.uint("w", 0..=MAX_SIDE)?.unwrap_or(0),
            height: p.uint("h", 0..=MAX_SIDE)?.unwrap_or(0),
            gravity: p.gravity("g")?.unwrap_or(Gravity::NorthWest),
        })
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &CropOptions) -> Result<()> {
        let canvas = ctx.canvas()?;
        let (x, y, w, h) = options.region(canvas.width(), canvas.height())?;
        if (x, y, w, h) == (0, 0, canvas.width(), canvas.height()) {
            return Ok(());
        }
        ctx.transform_canvas(move |c| {
            c.crop(x, y, w, h);
            Ok(())
        })
        .await
    }
}
