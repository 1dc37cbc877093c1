//! # mg-pipeline
//!
//! The action-pipeline dispatch engine of mediagate.
//!
//! This crate provides:
//!
//! - **Request parsing** ([`RequestActionParser`]) -- path and query to a
//!   [`PipelineRequest`] of resource URI plus action tokens, including
//!   `!style` references.
//! - **[`Action`]** trait -- one named transform with pure validation,
//!   intent-returning hooks, and async execution.
//! - **[`ActionMask`]** / **[`PipelineContext`]** -- per-request state; hooks
//!   return [`Intent`]s that the dispatcher applies centrally.
//! - **Processors** ([`processor`]) -- the `image` family decoded in process
//!   and the `video` family run through ffmpeg.
//! - **[`Dispatcher`]** -- style expansion, planning, both hook phases, and
//!   mask-driven execution in token order.

pub mod action;
pub mod actions;
pub mod context;
pub mod dispatcher;
pub mod imaging;
pub mod mask;
pub mod params;
pub mod parser;
pub mod processor;
pub mod registry;
pub mod store;
pub mod style;
pub mod token;

// Re-export key types at the crate root.
pub use action::{Action, DynAction};
pub use context::{Intent, PipelineContext, ProcessOutcome};
pub use dispatcher::Dispatcher;
pub use mask::ActionMask;
pub use parser::{PipelineRequest, RequestActionParser};
pub use processor::{Processor, ProcessorRegistry};
pub use registry::ActionRegistry;
pub use store::{ContentObject, ContentStore, StyleDefinition, StyleStore};
pub use style::StyleResolver;
pub use token::ActionToken;
