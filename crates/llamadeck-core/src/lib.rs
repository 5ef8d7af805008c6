// Domain modules
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod modelfile;
pub mod pull;
pub mod transcript;

pub use catalog::{CatalogEntry, CATALOG, LIBRARY_URL};
pub use config::{DefaultsConfig, Endpoint, LlamaDeckConfig, OllamaConfig};
pub use context::ConversationContext;
pub use error::{ErrorKind, LlamaDeckError, Result};
pub use model::ModelDescriptor;
pub use modelfile::{validate_model_name, ModelDefinition};
pub use pull::{progress_fraction, PullEvent};
pub use transcript::{ChatMessage, MessageRole, Transcript};
