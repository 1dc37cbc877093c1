//! Top-level request dispatch.
//!
//! [`Dispatcher::dispatch`] drives one request through its whole life:
//! style expansion, processor selection, planning, the pre-decode hook
//! phase, source loading, the pre-execute hook phase, mask-driven execution
//! in token order, and finally the processor's outcome.

use std::sync::Arc;

use mg_core::{Error, LimitsHandle, Result};

use crate::context::{Intent, PipelineContext, ProcessOutcome};
use crate::parser::PipelineRequest;
use crate::processor::ProcessorRegistry;
use crate::registry::PlannedAction;
use crate::store::ContentStore;
use crate::style::StyleResolver;

/// Which hook a phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeNewContext,
    BeforeProcess,
}

/// Shared entry point for every request. Built once at start-up.
pub struct Dispatcher {
    processors: ProcessorRegistry,
    styles: StyleResolver,
    store: Arc<dyn ContentStore>,
    limits: LimitsHandle,
}

impl Dispatcher {
    pub fn new(
        processors: ProcessorRegistry,
        styles: StyleResolver,
        store: Arc<dyn ContentStore>,
        limits: LimitsHandle,
    ) -> Self {
        Self {
            processors,
            styles,
            store,
            limits,
        }
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    /// Handle for the control plane to reconfigure limits.
    pub fn limits(&self) -> &LimitsHandle {
        &self.limits
    }

    /// Run `request` and return its outcome.
    ///
    /// Any failure aborts the request; nothing partial is returned.
    pub async fn dispatch(&self, request: &PipelineRequest) -> Result<ProcessOutcome> {
        if request.is_passthrough() {
            tracing::debug!(uri = %request.uri, "No actions, passing through");
            let object = self.store.get(&request.uri).await?;
            return Ok(ProcessOutcome::passthrough(&object));
        }

        let tokens = if request.is_style() {
            self.styles.expand(&request.tokens).await?
        } else {
            request.tokens.clone()
        };

        let name = tokens
            .first()
            .ok_or_else(|| Error::Internal("empty token list after expansion".into()))?;
        let processor = self
            .processors
            .get(name)
            .ok_or_else(|| Error::invalid(format!("unsupported processor: {name}")))?;
        let plan = processor.actions().plan(&tokens)?;

        tracing::info!(
            uri = %request.uri,
            processor = processor.name(),
            actions = plan.len(),
            "Dispatching request"
        );

        let mut ctx = PipelineContext::new(
            request.uri.clone(),
            tokens,
            Arc::clone(&self.store),
            self.limits.snapshot(),
        );

        let intents = collect_intents(&plan, &ctx, Phase::BeforeNewContext)?;
        ctx.apply(intents)?;

        processor.new_context(&mut ctx).await?;

        let intents = collect_intents(&plan, &ctx, Phase::BeforeProcess)?;
        ctx.apply(intents)?;

        for step in &plan {
            if ctx.mask.is_disabled(step.index) {
                tracing::debug!(index = step.index, action = %step.token.name, "Skipping disabled action");
                continue;
            }
            tracing::debug!(index = step.index, action = %step.token.name, "Running action");
            if let Err(e) = step.action.process_boxed(&mut ctx, &step.options).await {
                tracing::warn!(
                    uri = %ctx.uri,
                    index = step.index,
                    action = %step.token.name,
                    error = %e,
                    "Action failed"
                );
                return Err(e);
            }
        }

        processor.finish(&mut ctx).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("processors", &self.processors)
            .finish_non_exhaustive()
    }
}

/// Run one hook phase for every enabled position, in token order.
///
/// All hooks of a phase see the same context; their intents are applied
/// together afterwards.
fn collect_intents(plan: &[PlannedAction], ctx: &PipelineContext, phase: Phase) -> Result<Vec<Intent>> {
    let mut intents = Vec::new();
    for step in plan {
        if ctx.mask.is_disabled(step.index) {
            continue;
        }
        let produced = match phase {
            Phase::BeforeNewContext => {
                step.action.before_new_context_boxed(ctx, &step.options, step.index)?
            }
            Phase::BeforeProcess => {
                step.action.before_process_boxed(ctx, &step.options, step.index)?
            }
        };
        if !produced.is_empty() {
            tracing::debug!(index = step.index, ?phase, ?produced, "Hook intents");
        }
        intents.extend(produced);
    }
    Ok(intents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mg_core::RuntimeLimits;

    use crate::action::Action;
    use crate::processor::Processor;
    use crate::registry::ActionRegistry;
    use crate::store::{ContentObject, MemoryContentStore, MemoryStyleStore};

    /// Adds one header per run.
    struct Mark;

    #[async_trait]
    impl Action for Mark {
        type Options = ();

        fn name(&self) -> &'static str {
            "mark"
        }

        fn validate(&self, _params: &[String]) -> Result<()> {
            Ok(())
        }

        async fn process(&self, ctx: &mut PipelineContext, _options: &()) -> Result<()> {
            let i = ctx.headers.len();
            ctx.headers.insert(format!("ran-{i}"), "mark".into());
            Ok(())
        }
    }

    /// Disables the position after it.
    struct SkipNext;

    #[async_trait]
    impl Action for SkipNext {
        type Options = ();

        fn name(&self) -> &'static str {
            "skip-next"
        }

        fn validate(&self, _params: &[String]) -> Result<()> {
            Ok(())
        }

        fn before_process(&self, ctx: &PipelineContext, _options: &(), index: usize) -> Result<Vec<Intent>> {
            if index + 1 < ctx.mask.len() {
                return Ok(vec![Intent::Disable(index + 1)]);
            }
            Ok(Vec::new())
        }

        async fn process(&self, _ctx: &mut PipelineContext, _options: &()) -> Result<()> {
            Ok(())
        }
    }

    /// Fails when executed.
    struct Boom;

    #[async_trait]
    impl Action for Boom {
        type Options = ();

        fn name(&self) -> &'static str {
            "boom"
        }

        fn validate(&self, _params: &[String]) -> Result<()> {
            Ok(())
        }

        async fn process(&self, _ctx: &mut PipelineContext, _options: &()) -> Result<()> {
            Err(Error::Internal("boom".into()))
        }
    }

    struct Recorder {
        actions: ActionRegistry,
    }

    #[async_trait]
    impl Processor for Recorder {
        fn name(&self) -> &'static str {
            "test"
        }

        fn actions(&self) -> &ActionRegistry {
            &self.actions
        }

        async fn new_context(&self, _ctx: &mut PipelineContext) -> Result<()> {
            Ok(())
        }

        async fn finish(&self, ctx: &mut PipelineContext) -> Result<ProcessOutcome> {
            Ok(ProcessOutcome::new(ctx.headers.len().to_string(), "text/plain"))
        }
    }

    fn dispatcher() -> Dispatcher {
        let store = MemoryContentStore::new();
        store.insert("a.txt", ContentObject::new(&b"hello"[..], "text/plain"));
        let styles: MemoryStyleStore = [("two", "test/mark/mark"), ("bad", "nope/mark")]
            .into_iter()
            .collect();
        let processors = ProcessorRegistry::new().with(Arc::new(Recorder {
            actions: ActionRegistry::new().with(Mark).with(SkipNext).with(Boom),
        }));
        Dispatcher::new(
            processors,
            StyleResolver::new(Arc::new(styles)),
            Arc::new(store),
            LimitsHandle::new(RuntimeLimits::default()),
        )
    }

    fn request(tokens: &[&str]) -> PipelineRequest {
        PipelineRequest::new("a.txt", tokens.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn passthrough_returns_stored_object() {
        let outcome = dispatcher().dispatch(&request(&[])).await.unwrap();
        assert_eq!(&outcome.payload[..], b"hello");
        assert_eq!(outcome.content_type, "text/plain");
    }

    #[tokio::test]
    async fn enabled_actions_run() {
        let outcome = dispatcher()
            .dispatch(&request(&["test", "mark", "mark", "mark"]))
            .await
            .unwrap();
        assert_eq!(&outcome.payload[..], b"3");
    }

    #[tokio::test]
    async fn hooks_disable_later_positions() {
        let outcome = dispatcher()
            .dispatch(&request(&["test", "skip-next", "mark", "mark"]))
            .await
            .unwrap();
        assert_eq!(&outcome.payload[..], b"1");
    }

    #[tokio::test]
    async fn disabled_failing_action_never_runs() {
        let outcome = dispatcher()
            .dispatch(&request(&["test", "skip-next", "boom"]))
            .await
            .unwrap();
        assert_eq!(&outcome.payload[..], b"0");

        let err = dispatcher()
            .dispatch(&request(&["test", "mark", "boom"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn unknown_names_are_invalid() {
        let d = dispatcher();
        assert!(matches!(
            d.dispatch(&request(&["nope", "mark"])).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            d.dispatch(&request(&["test", "resize,w_1"])).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn styles_expand_before_dispatch() {
        let d = dispatcher();
        let outcome = d.dispatch(&request(&["style", "two"])).await.unwrap();
        assert_eq!(&outcome.payload[..], b"2");

        assert!(matches!(
            d.dispatch(&request(&["style", "bad"])).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            d.dispatch(&request(&["style", "missing"])).await,
            Err(Error::InvalidArgument(_))
        ));
    }
}
