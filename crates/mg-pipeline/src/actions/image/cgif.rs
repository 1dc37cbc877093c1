//! `cgif,s_<n>`: keep only the first `n` frames of an animation.

use async_trait::async_trait;
use mg_core::{Error, Result};

use crate::action::Action;
use crate::context::{FeatureKey, FeatureValue, Intent, PipelineContext};
use crate::params::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgifOptions {
    pub frames: u32,
}

#[derive(Debug, Default)]
pub struct CgifAction;

#[async_trait]
impl Action for CgifAction {
    type Options = CgifOptions;

    fn name(&self) -> &'static str {
        "cgif"
    }

    fn validate(&self, params: &[String]) -> Result<CgifOptions> {
        let p = Params::parse("cgif", params, &["s"])?;
        p.no_bare()?;
        let frames = p
            .uint("s", 1..=1000)?
            .ok_or_else(|| Error::invalid("cgif: s is required"))?;
        Ok(CgifOptions { frames })
    }

    /// The frame cap has to be known before decoding.
    fn before_new_context(
        &self,
        _ctx: &PipelineContext,
        options: &CgifOptions,
        _index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(vec![Intent::SetFeature(
            FeatureKey::MaxFrames,
            FeatureValue::Number(u64::from(options.frames)),
        )])
    }

    fn before_process(
        &self,
        ctx: &PipelineContext,
        _options: &CgifOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        if ctx.metadata()?.frames <= 1 {
            return Ok(vec![Intent::Disable(index)]);
        }
        Ok(Vec::new())
    }

    async fn process(&self, ctx: &mut PipelineContext, _options: &CgifOptions) -> Result<()> {
        // Frames were already dropped at decode; force a re-encode.
        ctx.canvas_mut()?.mark_modified();
        Ok(())
    }
}
