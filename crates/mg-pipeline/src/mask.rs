//! Per-request enable/disable vector over the parsed tokens.

/// Positional on/off switch for every token of a request.
///
/// Position 0 is the processor name. Hooks and execution only look at
/// positions from 1 on, but [`disable_all`](Self::disable_all) covers every
/// position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMask {
    tokens: Vec<String>,
    enabled: Vec<bool>,
}

impl ActionMask {
    /// A mask over `tokens` with every position enabled.
    pub fn new(tokens: Vec<String>) -> Self {
        let enabled = vec![true; tokens.len()];
        Self { tokens, enabled }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token text at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn action(&self, i: usize) -> &str {
        &self.tokens[i]
    }

    /// All tokens, enabled or not.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn is_enabled(&self, i: usize) -> bool {
        self.enabled[i]
    }

    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn is_disabled(&self, i: usize) -> bool {
        !self.enabled[i]
    }

    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn enable(&mut self, i: usize) {
        self.enabled[i] = true;
    }

    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn disable(&mut self, i: usize) {
        self.enabled[i] = false;
    }

    /// Disable every position, turning the rest of the pipeline into a
    /// passthrough.
    pub fn disable_all(&mut self) {
        self.enabled.fill(false);
    }

    /// Whether any action position (index 1 and up) is still enabled.
    pub fn any_action_enabled(&self) -> bool {
        self.enabled.iter().skip(1).any(|e| *e)
    }

    /// Enabled tokens in position order.
    pub fn filter_enabled_actions(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .zip(&self.enabled)
            .filter(|(_, enabled)| **enabled)
            .map(|(t, _)| t.as_str())
            .collect()
    }

    /// Visit every position regardless of its state.
    pub fn for_each_action<F>(&self, mut f: F)
    where
        F: FnMut(&str, bool, usize),
    {
        for (i, (token, enabled)) in self.tokens.iter().zip(&self.enabled).enumerate() {
            f(token, *enabled, i);
        }
    }
}
