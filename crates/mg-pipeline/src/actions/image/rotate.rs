//! `rotate,<degrees>`: clockwise rotation.

use async_trait::async_trait;
use mg_core::Result;

use crate::action::Action;
use crate::context::{Intent, PipelineContext};
use crate::params::{parse_in_range, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotateOptions {
    /// In [0, 360); 360 is folded to 0.
    pub degrees: u32,
}

#[derive(Debug, Default)]
pub struct RotateAction;

#[async_trait]
impl Action for RotateAction {
    type Options = RotateOptions;

    fn name(&self) -> &'static str {
        "rotate"
    }

    fn validate(&self, params: &[String]) -> Result<RotateOptions> {
        let p = Params::parse("rotate", params, &[])?;
        let degrees = parse_in_range("rotate", "degrees", p.single_bare()?, &(0..=360u32))?;
        Ok(RotateOptions {
            degrees: degrees % 360,
        })
    }

    fn before_process(
        &self,
        _ctx: &PipelineContext,
        options: &RotateOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(if options.degrees == 0 {
            vec![Intent::Disable(index)]
        } else {
            Vec::new()
        })
    }

    async fn process(&self, ctx: &mut PipelineContext, options: &RotateOptions) -> Result<()> {
        let degrees = options.degrees;
        ctx.transform_canvas(move |c| {
            c.rotate(degrees);
            Ok(())
        })
        .await
    }
}
