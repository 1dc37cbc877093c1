//! The [`Action`] trait defines a single pipeline step.
//!
//! Every transform name has one implementation. An action first validates
//! its parameter segments into typed options, may then return [`Intent`]s
//! from two hooks (before decode and after decode), and finally processes
//! the context if its position is still enabled.
//!
//! The registry stores actions behind the object-safe [`DynAction`], which
//! every [`Action`] gets through a blanket impl; options travel as
//! [`BoxedOptions`] between validation and execution.

use std::any::Any;
use std::fmt;

use async_trait::async_trait;

use mg_core::{Error, Result};

use crate::context::{Intent, PipelineContext};

/// Validated options of some action, type-erased.
pub type BoxedOptions = Box<dyn Any + Send + Sync>;

/// A single step in a processing pipeline.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    /// Parsed parameters.
    type Options: fmt::Debug + Send + Sync + 'static;

    /// Stable name matching the token's leading segment (e.g. "resize").
    fn name(&self) -> &'static str;

    /// Parse and range-check parameter segments.
    ///
    /// Must be pure: no I/O, no context access. Errors are
    /// [`Error::InvalidArgument`] naming the offending key.
    fn validate(&self, params: &[String]) -> Result<Self::Options>;

    /// Runs before the resource is fetched and decoded.
    ///
    /// `index` is this action's position in the token list. The default
    /// returns no intents.
    fn before_new_context(
        &self,
        _ctx: &PipelineContext,
        _options: &Self::Options,
        _index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(Vec::new())
    }

    /// Runs after decode, before any action executes.
    ///
    /// The default returns no intents.
    fn before_process(
        &self,
        _ctx: &PipelineContext,
        _options: &Self::Options,
        _index: usize,
    ) -> Result<Vec<Intent>> {
        Ok(Vec::new())
    }

    /// Perform the transform.
    async fn process(&self, ctx: &mut PipelineContext, options: &Self::Options) -> Result<()>;
}

/// Object-safe view of an [`Action`], used by the registry.
#[async_trait]
pub trait DynAction: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate_boxed(&self, params: &[String]) -> Result<BoxedOptions>;

    fn before_new_context_boxed(
        &self,
        ctx: &PipelineContext,
        options: &BoxedOptions,
        index: usize,
    ) -> Result<Vec<Intent>>;

    fn before_process_boxed(
        &self,
        ctx: &PipelineContext,
        options: &BoxedOptions,
        index: usize,
    ) -> Result<Vec<Intent>>;

    async fn process_boxed(&self, ctx: &mut PipelineContext, options: &BoxedOptions) -> Result<()>;
}

fn downcast<'a, A: Action>(action: &A, options: &'a BoxedOptions) -> Result<&'a A::Options> {
    options.downcast_ref::<A::Options>().ok_or_else(|| {
        Error::Internal(format!("options passed to {} are of the wrong type", Action::name(action)))
    })
}

#[async_trait]
impl<A: Action> DynAction for A {
    fn name(&self) -> &'static str {
        Action::name(self)
    }

    fn validate_boxed(&self, params: &[String]) -> Result<BoxedOptions> {
        Ok(Box::new(self.validate(params)?))
    }

    fn before_new_context_boxed(
        &self,
        ctx: &PipelineContext,
        options: &BoxedOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        self.before_new_context(ctx, downcast(self, options)?, index)
    }

    fn before_process_boxed(
        &self,
        ctx: &PipelineContext,
        options: &BoxedOptions,
        index: usize,
    ) -> Result<Vec<Intent>> {
        self.before_process(ctx, downcast(self, options)?, index)
    }

    async fn process_boxed(&self, ctx: &mut PipelineContext, options: &BoxedOptions) -> Result<()> {
        let options = downcast(self, options)?;
        self.process(ctx, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mg_core::RuntimeLimits;

    use crate::store::MemoryContentStore;

    #[derive(Debug, PartialEq)]
    struct EchoOptions(usize);

    struct Echo;

    #[async_trait]
    impl Action for Echo {
        type Options = EchoOptions;

        fn name(&self) -> &'static str {
            "echo"
        }

        fn validate(&self, params: &[String]) -> Result<EchoOptions> {
            Ok(EchoOptions(params.len()))
        }

        fn before_process(
            &self,
            _ctx: &PipelineContext,
            options: &EchoOptions,
            index: usize,
        ) -> Result<Vec<Intent>> {
            Ok(if options.0 == 0 {
                vec![Intent::Disable(index)]
            } else {
                Vec::new()
            })
        }

        async fn process(&self, ctx: &mut PipelineContext, options: &EchoOptions) -> Result<()> {
            ctx.headers.insert("echo".into(), options.0.to_string());
            Ok(())
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new(
            "x",
            vec!["image".into(), "echo".into()],
            Arc::new(MemoryContentStore::new()),
            Arc::new(RuntimeLimits::default()),
        )
    }

    #[tokio::test]
    async fn boxed_calls_reach_typed_impl() {
        let action: Arc<dyn DynAction> = Arc::new(Echo);
        assert_eq!(action.name(), "echo");

        let opts = action.validate_boxed(&["a".into(), "b".into()]).unwrap();
        let mut c = ctx();
        assert!(action.before_new_context_boxed(&c, &opts, 1).unwrap().is_empty());
        assert!(action.before_process_boxed(&c, &opts, 1).unwrap().is_empty());
        action.process_boxed(&mut c, &opts).await.unwrap();
        assert_eq!(c.headers["echo"], "2");
    }

    #[test]
    fn hook_sees_its_index() {
        let action: Arc<dyn DynAction> = Arc::new(Echo);
        let opts = action.validate_boxed(&[]).unwrap();
        let intents = action.before_process_boxed(&ctx(), &opts, 1).unwrap();
        assert_eq!(intents, vec![Intent::Disable(1)]);
    }

    #[tokio::test]
    async fn foreign_options_are_internal_error() {
        let action: Arc<dyn DynAction> = Arc::new(Echo);
        let wrong: BoxedOptions = Box::new(42u8);
        let mut c = ctx();
        assert!(matches!(
            action.process_boxed(&mut c, &wrong).await,
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn validate_is_repeatable() {
        let params: Vec<String> = vec!["x".into()];
        let first = Echo.validate(&params).unwrap();
        let second = Echo.validate(&params).unwrap();
        assert_eq!(first, second);
    }
}
