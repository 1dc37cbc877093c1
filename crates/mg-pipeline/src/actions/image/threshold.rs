//! `threshold,<bytes>`: only process sources at least this large.

use async_trait::async_trait;
use mg_core::Result;

use crate::action::Action;
use crate::context::{Intent, PipelineContext};
use crate::params::{parse_in_range, Params};

const MAX_THRESHOLD: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdOptions {
    pub min_bytes: u64,
}

#[derive(Debug, Default)]
pub struct ThresholdAction;

#[async_trait]
impl Action for ThresholdAction {
    type Options = ThresholdOptions;

    fn name(&self) -> &'static str {
        "threshold"
    }

    fn validate(&self, params: &[String]) -> Result<ThresholdOptions> {
        let p = Params::parse("threshold", params, &[])?;
        let min_bytes = parse_in_range("threshold", "bytes", p.single_bare()?, &(0..=MAX_THRESHOLD))?;
        Ok(ThresholdOptions { min_bytes })
    }

    fn before_process(
        &self,
        ctx: &PipelineContext,
        options: &ThresholdOptions,
        _index: usize,
    ) -> Result<Vec<Intent>> {
        let size = ctx.metadata()?.byte_size;
        if size < options.min_bytes {
            tracing::debug!(size, min_bytes = options.min_bytes, "Source below threshold, passing through");
            return Ok(vec![Intent::DisableAll]);
        }
        Ok(Vec::new())
    }

    async fn process(&self, _ctx: &mut PipelineContext, _options: &ThresholdOptions) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::image::testing::{ctx_with, raw};
    use mg_core::ImageFormat;

    #[test]
    fn validation() {
        assert_eq!(ThresholdAction.validate(&raw(&["1024"])).unwrap().min_bytes, 1024);
        assert!(ThresholdAction.validate(&raw(&["4294967297"])).is_err());
        assert!(ThresholdAction.validate(&raw(&["b_10"])).is_err());
    }

    #[test]
    fn small_source_disables_all() {
        let ctx = ctx_with(&["image", "threshold,100000000", "resize,w_1"], 4, 4, ImageFormat::Png);
        let intents = ThresholdAction
            .before_process(&ctx, &ThresholdOptions { min_bytes: 100_000_000 }, 1)
            .unwrap();
        assert_eq!(intents, vec![Intent::DisableAll]);

        let intents = ThresholdAction
            .before_process(&ctx, &ThresholdOptions { min_bytes: 0 }, 1)
            .unwrap();
        assert!(intents.is_empty());
    }
}
