use std::sync::Arc;

use llamadeck_core::ConversationContext;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

/// Caller-owned conversation state.
///
/// Clones share the same context. A generation holds the context lock for its
/// whole stream, so generations on one session run one at a time and their
/// appends never interleave.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    context: Arc<Mutex<ConversationContext>>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            context: Arc::new(Mutex::new(ConversationContext::new())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the context, taken once any running generation has finished.
    pub async fn context(&self) -> ConversationContext {
        self.context.lock().await.clone()
    }

    pub async fn reset(&self) {
        let mut context = self.context.lock().await;
        context.clear();
        info!(session = %self.id, "Conversation context cleared");
    }

    pub async fn add_context(&self, tokens: &[i64]) {
        let mut context = self.context.lock().await;
        context.extend(tokens);
        info!(session = %self.id, added = tokens.len(), total = context.len(), "Conversation context extended");
    }

    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<ConversationContext> {
        self.context.clone().lock_owned().await
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
