use serde::{Deserialize, Serialize};

/// Opaque token list the server uses to recall earlier turns.
///
/// Grows only by appending the tokens a finished generation returns, and is
/// only ever cleared as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    tokens: Vec<i64>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, tokens: &[i64]) {
        self.tokens.extend_from_slice(tokens);
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn tokens(&self) -> &[i64] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
