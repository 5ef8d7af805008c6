use std::time::Duration;

use llamadeck_core::{
    progress_fraction, Endpoint, LlamaDeckConfig, LlamaDeckError, ModelDefinition, ModelDescriptor,
    OllamaConfig, PullEvent, Result,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::ndjson::RecordReader;
use crate::protocol::{
    CreateRecord, CreateRequest, ErrorBody, GenerateRecord, GenerateRequest, NameRequest,
    PullRecord, TagsResponse,
};
use crate::session::ChatSession;
use crate::stream::{emit, emit_terminal, or_cancel, EventStream};

pub type PullStream = EventStream<PullEvent>;
pub type GenerationStream = EventStream<Result<String>>;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    stream_buffer: usize,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: &LlamaDeckConfig) -> Result<Self> {
        // No overall timeout: pulls may stream for minutes. Streams use an idle timeout instead.
        let client = Client::builder()
            .connect_timeout(config.ollama.connect_timeout())
            .build()
            .map_err(|e| LlamaDeckError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config: config.ollama.clone(),
            stream_buffer: config.defaults.stream_buffer,
            client,
        })
    }

    pub fn with_host(host: &str) -> Result<Self> {
        Self::new(&LlamaDeckConfig::default().with_host(host))
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn request(&self, endpoint: Endpoint) -> RequestBuilder {
        self.client.request(http_method(endpoint), self.config.url(endpoint))
    }

    fn stream_job(&self, endpoint: Endpoint, cancel: CancellationToken) -> StreamJob {
        StreamJob {
            client: self.client.clone(),
            endpoint,
            url: self.config.url(endpoint),
            idle_timeout: self.config.stream_idle_timeout(),
            cancel,
        }
    }

    /// Installed models, one GET, no retry, no cache.
    #[instrument(skip_all, fields(host = %self.config.host))]
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        debug!("Fetching models from Ollama API");

        let response = self
            .request(Endpoint::Tags)
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(map_reqwest_error)
            .inspect_err(|e| error!(error = %e, "Failed to list models"))?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            error!(error = %err, "Failed to list models");
            return Err(err);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(map_reqwest_error)
            .inspect_err(|e| error!(error = %e, "Failed to decode model list"))?;

        let models: Vec<ModelDescriptor> = tags
            .models
            .into_iter()
            .map(|m| {
                let identifier = m.model.unwrap_or_else(|| m.name.clone());
                ModelDescriptor::new(m.name, identifier)
            })
            .collect();

        info!(count = models.len(), "Fetched models from Ollama");
        Ok(models)
    }

    /// Succeeds only on HTTP 200.
    #[instrument(skip_all, fields(model = %name))]
    pub async fn delete_model(&self, name: &str) -> Result<()> {
        info!("Deleting model");

        let response = self
            .request(Endpoint::Delete)
            .json(&NameRequest { name })
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(map_reqwest_error)
            .inspect_err(|e| error!(model = name, error = %e, "Failed to delete model"))?;

        if response.status() != StatusCode::OK {
            let err = status_error(response).await;
            error!(model = name, error = %err, "Failed to delete model");
            return Err(err);
        }

        info!(model = name, "Model deleted");
        Ok(())
    }

    /// Build `name` from `FROM <base_model>` + `SYSTEM <directive>`.
    pub async fn create_custom_model(&self, base_model: &str, name: &str, directive: &str) -> Result<()> {
        let definition = ModelDefinition::new(base_model, directive);
        self.create_model(name, &definition, &CancellationToken::new()).await
    }

    /// Submit `definition` and follow the status stream until a record reports
    /// `success`. A stream that ends without it is an error.
    #[instrument(skip_all, fields(model = %name, base = %definition.base_model))]
    pub async fn create_model(
        &self,
        name: &str,
        definition: &ModelDefinition,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Creating custom model");
        self.follow_create(name, definition, cancel)
            .await
            .inspect_err(|e| error!(model = name, error = %e, "Failed to create custom model"))
    }

    async fn follow_create(
        &self,
        name: &str,
        definition: &ModelDefinition,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = CreateRequest {
            name,
            modelfile: definition.render(),
        };

        let response = or_cancel(cancel, self.request(Endpoint::Create).json(&request).send())
            .await?
            .map_err(map_reqwest_error)?;

        if response.status() != StatusCode::OK {
            return Err(status_error(response).await);
        }

        let mut records = RecordReader::<CreateRecord>::new(response, self.config.stream_idle_timeout());
        loop {
            let Some(record) = or_cancel(cancel, records.next()).await? else {
                return Err(LlamaDeckError::Protocol(
                    "create stream ended without a success status".to_string(),
                ));
            };
            let record = record?;

            if let Some(message) = record.error {
                return Err(LlamaDeckError::Server(message));
            }

            match record.status.as_deref() {
                Some("success") => {
                    info!(model = name, "Custom model created");
                    return Ok(());
                }
                status => debug!(?status, "Create status"),
            }
        }
    }

    /// Stream a model download. Must be called within a tokio runtime.
    ///
    /// Yields non-decreasing progress fractions and always ends with exactly one
    /// terminal event, unless the consumer drops the stream first. Cancelling
    /// ends it with `PullEvent::Cancelled` after the events already buffered.
    #[instrument(skip_all, fields(model = %name))]
    pub fn pull_model(&self, name: &str) -> PullStream {
        info!("Starting model pull");

        let cancel = CancellationToken::new();
        let (tx, stream) = EventStream::channel(self.stream_buffer, cancel.clone());
        let job = self.stream_job(Endpoint::Pull, cancel);

        let span = info_span!("pull", model = %name);
        tokio::spawn(run_pull(job, name.to_string(), tx).instrument(span));
        stream
    }

    /// Stream generated text for `prompt`, continuing the conversation in `session`.
    /// Must be called within a tokio runtime.
    ///
    /// The session's context is extended with the server's tokens when the final
    /// record arrives; a consumer that stops early leaves the context unchanged.
    /// Errors, including ones the server reports mid-stream, arrive as `Err` items
    /// and end the stream.
    #[instrument(skip_all, fields(model = %model, session = %session.id()))]
    pub fn generate(&self, session: &ChatSession, model: &str, prompt: &str) -> GenerationStream {
        debug!(prompt_chars = prompt.chars().count(), "Starting generation");

        let cancel = CancellationToken::new();
        let (tx, stream) = EventStream::channel(self.stream_buffer, cancel.clone());
        let job = self.stream_job(Endpoint::Generate, cancel);

        let span = info_span!("generate", model = %model, session = %session.id());
        tokio::spawn(
            run_generate(job, session.clone(), model.to_string(), prompt.to_string(), tx).instrument(span),
        );
        stream
    }
}

/// What a spawned streaming task needs from the client.
struct StreamJob {
    client: Client,
    endpoint: Endpoint,
    url: String,
    idle_timeout: Duration,
    cancel: CancellationToken,
}

impl StreamJob {
    fn request(&self) -> RequestBuilder {
        self.client.request(http_method(self.endpoint), &self.url)
    }
}

async fn run_pull(job: StreamJob, name: String, tx: mpsc::Sender<PullEvent>) {
    let terminal = match stream_pull(&job, &name, &tx).await {
        Ok(()) => {
            info!(model = %name, "Model pulled");
            PullEvent::Success
        }
        Err(LlamaDeckError::Cancelled) => {
            info!(model = %name, "Pull cancelled");
            PullEvent::Cancelled
        }
        Err(e) => {
            error!(model = %name, error = %e, "Failed to pull model");
            PullEvent::failed(e)
        }
    };

    emit_terminal(&tx, terminal).await;
}

async fn stream_pull(job: &StreamJob, name: &str, tx: &mpsc::Sender<PullEvent>) -> Result<()> {
    let request = job.request().json(&NameRequest { name }).send();
    let response = or_cancel(&job.cancel, request).await?.map_err(map_reqwest_error)?;

    if !response.status().is_success() {
        return Err(status_error(response).await);
    }

    let mut records = RecordReader::<PullRecord>::new(response, job.idle_timeout);
    let mut fraction = 0.0;
    loop {
        let Some(record) = or_cancel(&job.cancel, records.next()).await? else {
            return Ok(());
        };
        let record = record?;

        if let Some(message) = record.error {
            return Err(LlamaDeckError::Server(message));
        }

        // Status-only records ("pulling manifest", "success") carry no byte counts.
        // Each layer restarts its own count; the reported fraction never goes back.
        if record.total.is_some() {
            fraction = progress_fraction(record.completed, record.total).max(fraction);
        }
        debug!(fraction, status = ?record.status, "Pull progress");

        let event = PullEvent::Progress {
            fraction,
            status: record.status,
        };
        if !emit(tx, &job.cancel, event).await {
            return Err(LlamaDeckError::Cancelled);
        }
    }
}

async fn run_generate(
    job: StreamJob,
    session: ChatSession,
    model: String,
    prompt: String,
    tx: mpsc::Sender<Result<String>>,
) {
    match stream_generate(&job, &session, &model, &prompt, &tx).await {
        Ok(()) => info!(model = %model, "Generation complete"),
        Err(LlamaDeckError::Cancelled) => {
            info!(model = %model, "Generation cancelled");
            emit_terminal(&tx, Err(LlamaDeckError::Cancelled)).await;
        }
        Err(e) => {
            error!(model = %model, error = %e, "Failed to generate text");
            emit_terminal(&tx, Err(e)).await;
        }
    }
}

async fn stream_generate(
    job: &StreamJob,
    session: &ChatSession,
    model: &str,
    prompt: &str,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<()> {
    // Held until the stream ends; serializes generations on this session.
    let mut context = or_cancel(&job.cancel, session.acquire()).await?;

    let request = GenerateRequest {
        model,
        prompt,
        context: context.tokens(),
    };
    let send = job.request().json(&request).send();
    let response = or_cancel(&job.cancel, send).await?.map_err(map_reqwest_error)?;

    if !response.status().is_success() {
        return Err(status_error(response).await);
    }

    let mut records = RecordReader::<GenerateRecord>::new(response, job.idle_timeout);
    loop {
        let Some(record) = or_cancel(&job.cancel, records.next()).await? else {
            return Err(LlamaDeckError::Protocol(
                "generation stream ended before completion".to_string(),
            ));
        };
        let record = record?;

        if let Some(message) = record.error {
            return Err(LlamaDeckError::Server(message));
        }

        if record.done {
            let tokens = record.context.unwrap_or_else(|| {
                warn!("Final record carried no context");
                Vec::new()
            });
            context.extend(&tokens);
            info!(
                session = %session.id(),
                appended = tokens.len(),
                total = context.len(),
                "Conversation context extended"
            );
            emit_terminal(tx, Ok(record.response)).await;
            return Ok(());
        }

        if !emit(tx, &job.cancel, Ok(record.response)).await {
            return Err(LlamaDeckError::Cancelled);
        }
    }
}

fn http_method(endpoint: Endpoint) -> Method {
    match endpoint.method() {
        "GET" => Method::GET,
        "DELETE" => Method::DELETE,
        _ => Method::POST,
    }
}

/// Map reqwest errors to LlamaDeckError, separating connection failures and timeouts.
pub(crate) fn map_reqwest_error(e: reqwest::Error) -> LlamaDeckError {
    if e.is_connect() {
        return LlamaDeckError::ConnectionRefused(e.to_string());
    }
    if e.is_timeout() {
        return LlamaDeckError::Timeout(e.to_string());
    }
    if e.is_decode() {
        return LlamaDeckError::Protocol(e.to_string());
    }
    LlamaDeckError::Http(e.to_string())
}

/// Error for a non-200 reply, using the server's `{"error": ...}` message when present.
async fn status_error(response: Response) -> LlamaDeckError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) => body,
    };
    LlamaDeckError::UnexpectedStatus { status, body }
}
