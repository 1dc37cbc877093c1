//! Name-to-action lookup for one processor family, and request planning.

use std::collections::BTreeMap;
use std::sync::Arc;

use mg_core::{Error, Result};

use crate::action::{Action, BoxedOptions, DynAction};
use crate::token::ActionToken;

/// One validated position of a request.
pub struct PlannedAction {
    /// Position in the token list (always >= 1).
    pub index: usize,
    pub token: ActionToken,
    pub action: Arc<dyn DynAction>,
    pub options: BoxedOptions,
}

impl std::fmt::Debug for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedAction")
            .field("index", &self.index)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Actions of one processor, keyed by name.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<&'static str, Arc<dyn DynAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under its name, replacing any earlier entry.
    pub fn register<A: Action>(&mut self, action: A) -> &mut Self {
        let name = Action::name(&action);
        if self.actions.insert(name, Arc::new(action)).is_some() {
            tracing::warn!(action = name, "Replacing previously registered action");
        }
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<A: Action>(mut self, action: A) -> Self {
        self.register(action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Parse and validate every position after the processor name.
    ///
    /// Nothing is fetched or run; the first unknown name or invalid
    /// parameter fails the whole request.
    pub fn plan(&self, tokens: &[String]) -> Result<Vec<PlannedAction>> {
        tokens
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, raw)| {
                let token = ActionToken::parse(raw)?;
                let action = self
                    .get(&token.name)
                    .ok_or_else(|| Error::invalid(format!("unsupported action: {}", token.name)))?;
                let options = action.validate_boxed(&token.params)?;
                Ok(PlannedAction {
                    index,
                    token,
                    action,
                    options,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}
