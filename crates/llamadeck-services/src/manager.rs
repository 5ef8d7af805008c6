use std::sync::mpsc::{channel, Receiver};

use llamadeck_client::{ChatSession, GenerationStream, OllamaClient, PullStream};
use llamadeck_core::{
    CatalogEntry, ConversationContext, LlamaDeckConfig, LlamaDeckError, ModelDefinition,
    ModelDescriptor, Result, CATALOG,
};
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::StartScreen;

const WORKER_THREADS: usize = 2;

/// Function-level interface for front ends.
///
/// Owns the tokio runtime that performs all network I/O, so callers never block
/// on the network from their own threads unless they pick a blocking method.
/// Owns the single conversation session.
///
/// Per-operation contracts: listing reports an unreachable server as "no models",
/// delete and create report only success or failure, pull reports failures as a
/// terminal event, and generation hands every error to the caller.
///
/// The blocking methods panic when called from inside an async context.
pub struct ModelManager {
    client: OllamaClient,
    session: ChatSession,
    runtime: Runtime,
}

impl ModelManager {
    pub fn new(config: &LlamaDeckConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("llamadeck-io")
            .enable_all()
            .build()
            .map_err(|e| LlamaDeckError::Config(format!("Failed to create tokio runtime: {}", e)))?;

        let client = OllamaClient::new(config)?;
        info!(host = client.host(), "Model manager ready");

        Ok(Self {
            client,
            session: ChatSession::new(),
            runtime,
        })
    }

    pub fn host(&self) -> &str {
        self.client.host()
    }

    pub fn catalog(&self) -> &'static [CatalogEntry] {
        CATALOG
    }

    /// Installed models. Transport and protocol failures are logged and reported
    /// as an empty list.
    #[instrument(skip(self))]
    pub fn list_models(&self) -> Vec<ModelDescriptor> {
        match self.runtime.block_on(self.client.list_models()) {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "Model list unavailable, treating as no models installed");
                Vec::new()
            }
        }
    }

    /// Fetch models on the runtime and deliver the list through a channel
    pub fn fetch_models_async(&self) -> Receiver<Vec<ModelDescriptor>> {
        let (tx, rx) = channel();
        let client = self.client.clone();

        self.runtime.spawn(async move {
            let models = client.list_models().await.unwrap_or_else(|e| {
                warn!(error = %e, "Model list unavailable, treating as no models installed");
                Vec::new()
            });
            let _ = tx.send(models);
        });

        rx
    }

    /// Setup when nothing is installed or the server is unreachable, chat otherwise.
    pub fn start_screen(&self) -> StartScreen {
        StartScreen::from_models(self.list_models())
    }

    /// Start a pull. Never fails: failures arrive as the terminal event.
    pub fn pull_model(&self, name: &str) -> PullStream {
        let _guard = self.runtime.enter();
        self.client.pull_model(name)
    }

    /// True only when the server answered 200.
    #[instrument(skip(self))]
    pub fn delete_model(&self, name: &str) -> bool {
        match self.runtime.block_on(self.client.delete_model(name)) {
            Ok(()) => true,
            Err(e) => {
                warn!(model = name, error = %e, "Delete failed");
                false
            }
        }
    }

    pub fn delete_model_async(&self, name: &str) -> Receiver<bool> {
        let (tx, rx) = channel();
        let client = self.client.clone();
        let name = name.to_string();

        self.runtime.spawn(async move {
            let deleted = client.delete_model(&name).await.is_ok();
            let _ = tx.send(deleted);
        });

        rx
    }

    /// True once the server reports `success` for the new model.
    #[instrument(skip(self, directive))]
    pub fn create_custom_model(&self, base_model: &str, name: &str, directive: &str) -> bool {
        let result = self
            .runtime
            .block_on(self.client.create_custom_model(base_model, name, directive));

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(model = name, error = %e, "Custom model creation failed");
                false
            }
        }
    }

    /// Create on the runtime; the token stops following the status stream.
    pub fn create_custom_model_async(
        &self,
        base_model: &str,
        name: &str,
        directive: &str,
    ) -> (Receiver<bool>, CancellationToken) {
        let (tx, rx) = channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let client = self.client.clone();
        let name = name.to_string();
        let definition = ModelDefinition::new(base_model, directive);

        self.runtime.spawn(async move {
            let created = client.create_model(&name, &definition, &task_cancel).await.is_ok();
            let _ = tx.send(created);
        });

        (rx, cancel)
    }

    /// Stream a reply in the managed conversation. Errors are yielded, not hidden.
    pub fn generate(&self, model: &str, prompt: &str) -> GenerationStream {
        let _guard = self.runtime.enter();
        self.client.generate(&self.session, model, prompt)
    }

    /// Clear the conversation context, after any running generation finishes.
    pub fn reset_context(&self) {
        self.runtime.block_on(self.session.reset());
    }

    pub fn add_context(&self, tokens: &[i64]) {
        self.runtime.block_on(self.session.add_context(tokens));
    }

    pub fn context(&self) -> ConversationContext {
        self.runtime.block_on(self.session.context())
    }
}
