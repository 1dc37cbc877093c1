//! Style indirection: stored aliases for whole action paths.

use std::sync::Arc;

use mg_core::{Error, Result};

use crate::store::StyleStore;
use crate::token::split_action_path;

/// Pseudo-processor name of a style request (`["style", name]`).
pub const STYLE_PROCESSOR: &str = "style";

/// Expands `["style", name]` into the stored action path.
#[derive(Clone)]
pub struct StyleResolver {
    store: Arc<dyn StyleStore>,
}

impl std::fmt::Debug for StyleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleResolver").finish_non_exhaustive()
    }
}

impl StyleResolver {
    pub fn new(store: Arc<dyn StyleStore>) -> Self {
        Self { store }
    }

    /// Replace a style token list with the tokens of its expansion.
    ///
    /// An unknown style is the caller's fault. Expansions may not point at
    /// another style.
    pub async fn expand(&self, tokens: &[String]) -> Result<Vec<String>> {
        let name = match tokens {
            [processor, name] if processor == STYLE_PROCESSOR => name,
            _ => {
                return Err(Error::invalid(format!(
                    "style request must be [\"{STYLE_PROCESSOR}\", name], got {tokens:?}"
                )))
            }
        };

        let definition = match self.store.get(name).await {
            Ok(def) => def,
            Err(Error::NotFound { .. }) => {
                return Err(Error::invalid(format!("unknown style: {name}")));
            }
            Err(e) => return Err(e),
        };

        let expanded = split_action_path(&definition.expansion);
        match expanded.first().map(String::as_str) {
            None => Err(Error::invalid(format!("style {name} has an empty expansion"))),
            Some(STYLE_PROCESSOR) => Err(Error::invalid(format!(
                "style {name} refers to another style"
            ))),
            Some(processor) => {
                tracing::debug!(style = %name, processor, "Expanded style");
                Ok(expanded)
            }
        }
    }
}
