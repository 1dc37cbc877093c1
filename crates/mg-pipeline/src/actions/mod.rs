//! Built-in pipeline actions, grouped by processor family.
//!
//! Each action implements [`Action`](crate::action::Action) and is
//! registered in its family's [`ActionRegistry`](crate::registry::ActionRegistry)
//! by the `registry` function of its module.

pub mod image;
pub mod video;
