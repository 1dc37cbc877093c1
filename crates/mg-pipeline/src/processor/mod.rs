//! Processors: one per transform family, selected by the first token.
//!
//! A [`Processor`] owns the [`ActionRegistry`] of its family and knows how
//! to load a source into a [`PipelineContext`] and how to turn the context
//! into a [`ProcessOutcome`] once every enabled action has run.

mod image;
mod video;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mg_av::ToolRegistry;
use mg_core::config::Config;
use mg_core::Result;

use crate::context::{PipelineContext, ProcessOutcome};
use crate::registry::ActionRegistry;

pub use self::image::ImageProcessor;
pub use self::video::VideoProcessor;

/// A transform family.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used as the first token of a request (e.g. "image").
    fn name(&self) -> &'static str;

    /// Actions this processor accepts.
    fn actions(&self) -> &ActionRegistry;

    /// Load the source named by `ctx.uri`.
    ///
    /// May disable the whole mask when a global limit is exceeded.
    async fn new_context(&self, ctx: &mut PipelineContext) -> Result<()>;

    /// Build the outcome after execution.
    async fn finish(&self, ctx: &mut PipelineContext) -> Result<ProcessOutcome>;
}

/// Processors keyed by name.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<&'static str, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The image and video processors built from `config`.
    pub fn from_config(config: &Config, tools: Arc<ToolRegistry>) -> Self {
        Self::new()
            .with(Arc::new(ImageProcessor::new(config, Arc::clone(&tools))))
            .with(Arc::new(VideoProcessor::new(config, tools)))
    }

    pub fn register(&mut self, processor: Arc<dyn Processor>) -> &mut Self {
        let name = processor.name();
        if self.processors.insert(name, processor).is_some() {
            tracing::warn!(processor = name, "Replacing previously registered processor");
        }
        self
    }

    pub fn with(mut self, processor: Arc<dyn Processor>) -> Self {
        self.register(processor);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.processors.keys().copied()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.processors.keys()).finish()
    }
}

/// Merge context headers into `outcome` and set `content-type` from the
/// outcome's content type.
fn finalize_headers(ctx: &PipelineContext, mut outcome: ProcessOutcome) -> ProcessOutcome {
    outcome
        .headers
        .extend(ctx.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    outcome
        .headers
        .insert("content-type".into(), outcome.content_type.clone());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_registers_both_families() {
        let registry = ProcessorRegistry::from_config(&Config::default(), Arc::new(ToolRegistry::default()));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["image", "video"]);
        assert!(registry.get("image").unwrap().actions().contains("resize"));
        assert!(registry.get("video").unwrap().actions().contains("snapshot"));
        assert!(registry.get("style").is_none());
    }
}
