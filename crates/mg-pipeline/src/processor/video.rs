use std::sync::Arc;

use async_trait::async_trait;
use mg_av::ToolRegistry;
use mg_core::config::Config;
use mg_core::Result;

use super::{finalize_headers, Processor};
use crate::actions;
use crate::context::{PipelineContext, ProcessOutcome, SourceHandle};
use crate::registry::ActionRegistry;

/// Video files, handled by ffmpeg reading the source URL directly.
pub struct VideoProcessor {
    actions: ActionRegistry,
}

impl VideoProcessor {
    pub const NAME: &'static str = "video";

    pub fn new(config: &Config, tools: Arc<ToolRegistry>) -> Self {
        Self {
            actions: actions::video::registry(tools, &config.ceilings),
        }
    }
}

#[async_trait]
impl Processor for VideoProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    async fn new_context(&self, ctx: &mut PipelineContext) -> Result<()> {
        let url = ctx.store.url(&ctx.uri)?;
        tracing::debug!(uri = %ctx.uri, %url, "Video source resolved");
        ctx.source = Some(SourceHandle::Remote { url });
        Ok(())
    }

    async fn finish(&self, ctx: &mut PipelineContext) -> Result<ProcessOutcome> {
        let outcome = match ctx.result.take() {
            Some(result) => result,
            None => {
                // Every output action was disabled.
                let object = ctx.store.get(&ctx.uri).await?;
                ProcessOutcome::passthrough(&object)
            }
        };
        Ok(finalize_headers(ctx, outcome))
    }
}
