mod manager;
mod routing;

pub use manager::ModelManager;
pub use routing::StartScreen;

// Re-export client and core types so front ends only import from services
pub use llamadeck_client::{CancellationToken, ChatSession, EventStream, GenerationStream, PullStream};
pub use llamadeck_core::{
    validate_model_name, CatalogEntry, ChatMessage, ConversationContext, ErrorKind,
    LlamaDeckConfig, LlamaDeckError, MessageRole, ModelDescriptor, PullEvent, Result, Transcript,
    CATALOG, LIBRARY_URL,
};
