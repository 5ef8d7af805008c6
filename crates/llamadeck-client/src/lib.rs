mod ndjson;
mod ollama;
mod protocol;
mod session;
mod stream;

pub use ndjson::NdjsonDecoder;
pub use ollama::{GenerationStream, OllamaClient, PullStream};
pub use session::ChatSession;
pub use stream::EventStream;

pub use tokio_util::sync::CancellationToken;
