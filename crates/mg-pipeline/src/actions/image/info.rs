//! `info`: describe the source as JSON instead of transforming it.

use async_trait::async_trait;
use mg_core::Result;
use serde_json::json;

use crate::action::Action;
use crate::context::{Intent, PipelineContext, ProcessOutcome};
use crate::params::Params;

#[derive(Debug, Default)]
pub struct InfoAction;

#[async_trait]
impl Action for InfoAction {
    type Options = ();

    fn name(&self) -> &'static str {
        "info"
    }

    fn validate(&self, params: &[String]) -> Result<()> {
        Params::parse("info", params, &[])?.no_bare()
    }

    /// Nothing else runs when the caller asked for a description.
    fn before_process(&self, ctx: &PipelineContext, _options: &(), index: usize) -> Result<Vec<Intent>> {
        Ok((1..ctx.mask.len())
            .filter(|i| *i != index)
            .map(Intent::Disable)
            .collect())
    }

    async fn process(&self, ctx: &mut PipelineContext, _options: &()) -> Result<()> {
        let meta = ctx.metadata()?;
        let body = json!({
            "FileSize": { "value": meta.byte_size.to_string() },
            "Format": { "value": meta.format.to_string() },
            "ImageWidth": { "value": meta.width.to_string() },
            "ImageHeight": { "value": meta.height.to_string() },
            "Frames": { "value": meta.frames.to_string() },
        });
        let payload = serde_json::to_vec(&body)
            .map_err(|e| mg_core::Error::Internal(format!("info: {e}")))?;
        ctx.result = Some(ProcessOutcome::new(payload, "application/json"));
        Ok(())
    }
}
