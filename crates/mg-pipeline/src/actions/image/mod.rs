//! Actions of the `image` processor.
//!
//! All of them work on the decoded [`Canvas`](crate::imaging::Canvas);
//! pixel work goes through
//! [`PipelineContext::transform_canvas`](crate::context::PipelineContext::transform_canvas)
//! so it never runs on an async worker.

mod cgif;
mod crop;
mod filter;
mod format;
mod info;
mod resize;
mod rotate;
mod shape;
mod threshold;
mod watermark;

pub use cgif::{CgifAction, CgifOptions};
pub use crop::{CropAction, CropOptions};
pub use filter::{Amount, BlurAction, BlurOptions, BrightAction, ContrastAction, SharpenAction};
pub use format::{FormatAction, QualityAction, QualityOptions};
pub use info::InfoAction;
pub use resize::{ResizeAction, ResizeMode, ResizeOptions, ResizePlan};
pub use rotate::{RotateAction, RotateOptions};
pub use shape::{CircleAction, RadiusOptions, RoundedCornersAction};
pub use threshold::{ThresholdAction, ThresholdOptions};
pub use watermark::{WatermarkAction, WatermarkOptions};

use mg_core::config::ImagingConfig;

use crate::registry::ActionRegistry;

/// Every built-in image action.
pub fn registry(config: &ImagingConfig) -> ActionRegistry {
    ActionRegistry::new()
        .with(ResizeAction)
        .with(CropAction)
        .with(CircleAction)
        .with(RoundedCornersAction)
        .with(RotateAction)
        .with(BlurAction)
        .with(BrightAction)
        .with(ContrastAction)
        .with(SharpenAction)
        .with(FormatAction)
        .with(QualityAction::new(config.default_quality))
        .with(WatermarkAction::new(config.decode_timeout()))
        .with(InfoAction)
        .with(CgifAction)
        .with(ThresholdAction)
}
