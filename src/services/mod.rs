//! Collaborator services consumed by pipelines.
//!
//! Each capability is a small async trait. A [`FallbackChain`] composes any
//! number of implementations of one capability and returns the first success,
//! so pipelines only ever see one `Arc<dyn Trait>` per capability.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{ConfigError, ServicesConfig};
use crate::credentials::Credentials;
use crate::message::Media;

pub mod openai;

pub use openai::OpenAiClient;

/// Maximum characters of an upstream error body kept in errors.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Errors from collaborator services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// HTTP transport failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upstream responded with an error status.
    #[error("upstream returned {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Shortened response body.
        body: String,
    },

    /// Response did not match the expected schema.
    #[error("unexpected response: {0}")]
    Parse(String),

    /// The service answered but produced nothing usable.
    #[error("empty result: {0}")]
    Empty(String),

    /// No implementation is configured for this capability.
    #[error("no provider configured")]
    NoProvider,
}

/// Answer to a free-form prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Answer text.
    pub text: String,
    /// Cost of the call in USD; zero when unknown.
    pub cost: f64,
}

/// Speech-to-text result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Transcribed text.
    pub text: String,
    /// Detected language, if reported.
    pub language: Option<String>,
    /// Number of whitespace-separated words.
    pub word_count: usize,
}

impl Transcript {
    /// Transcript with the word count derived from the text.
    pub fn new(text: impl Into<String>, language: Option<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            text,
            language,
            word_count,
        }
    }
}

/// One generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Suggested file name.
    pub file_name: String,
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
}

/// Question answering.
#[async_trait]
pub trait Answerer: Send + Sync {
    /// Answer a prompt.
    async fn answer(&self, prompt: &str) -> Result<Answer, ServiceError>;
}

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio clip.
    async fn transcribe(&self, audio: &Media) -> Result<Transcript, ServiceError>;
}

/// Text-to-image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one or more images for a prompt.
    async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedImage>, ServiceError>;
}

/// Text-to-speech.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render text as speech in the given language. Returns encoded audio.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Ordered implementations of one capability; the first success wins.
pub struct FallbackChain<S: ?Sized> {
    providers: Vec<Arc<S>>,
}

impl<S: ?Sized> Default for FallbackChain<S> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<S: ?Sized + Send + Sync> FallbackChain<S> {
    /// Chain over the given providers, tried in order.
    pub fn new(providers: Vec<Arc<S>>) -> Self {
        Self { providers }
    }

    /// Append a provider.
    pub fn push(&mut self, provider: Arc<S>) {
        self.providers.push(provider);
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider in order, returning the first success or the last error.
    async fn first_success<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, ServiceError>
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ServiceError>> + Send,
    {
        let mut last_error = ServiceError::NoProvider;
        for (index, provider) in self.providers.iter().enumerate() {
            match call(Arc::clone(provider)).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(operation, provider = index, error = %e, "provider failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl Answerer for FallbackChain<dyn Answerer> {
    async fn answer(&self, prompt: &str) -> Result<Answer, ServiceError> {
        self.first_success("answer", |p| async move { p.answer(prompt).await })
            .await
    }
}

#[async_trait]
impl Transcriber for FallbackChain<dyn Transcriber> {
    async fn transcribe(&self, audio: &Media) -> Result<Transcript, ServiceError> {
        self.first_success("transcribe", |p| async move { p.transcribe(audio).await })
            .await
    }
}

#[async_trait]
impl ImageGenerator for FallbackChain<dyn ImageGenerator> {
    async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedImage>, ServiceError> {
        self.first_success("generate", |p| async move { p.generate(prompt).await })
            .await
    }
}

#[async_trait]
impl Synthesizer for FallbackChain<dyn Synthesizer> {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ServiceError> {
        self.first_success("synthesize", |p| async move {
            p.synthesize(text, language).await
        })
        .await
    }
}

/// Configured services, one chain per capability.
#[derive(Clone, Default)]
pub struct Services {
    /// Question answering.
    pub answerer: Option<Arc<dyn Answerer>>,
    /// Speech-to-text.
    pub transcriber: Option<Arc<dyn Transcriber>>,
    /// Text-to-image.
    pub image_generator: Option<Arc<dyn ImageGenerator>>,
    /// Text-to-speech.
    pub synthesizer: Option<Arc<dyn Synthesizer>>,
}

impl Services {
    /// Build services from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if a configured service's
    /// API key is not available.
    pub fn from_config(
        config: &ServicesConfig,
        credentials: &Credentials,
    ) -> Result<Self, ConfigError> {
        let mut answerers: FallbackChain<dyn Answerer> = FallbackChain::default();
        let mut transcribers: FallbackChain<dyn Transcriber> = FallbackChain::default();
        let mut image_generators: FallbackChain<dyn ImageGenerator> = FallbackChain::default();
        let mut synthesizers: FallbackChain<dyn Synthesizer> = FallbackChain::default();

        if let Some(openai) = &config.openai {
            let api_key = credentials.require(&openai.api_key_env)?;
            let client = Arc::new(OpenAiClient::new(openai.clone(), api_key));
            answerers.push(client.clone());
            transcribers.push(client.clone());
            image_generators.push(client.clone());
            synthesizers.push(client);
        }

        Ok(Self {
            answerer: non_empty(answerers).map(|c| Arc::new(c) as Arc<dyn Answerer>),
            transcriber: non_empty(transcribers).map(|c| Arc::new(c) as Arc<dyn Transcriber>),
            image_generator: non_empty(image_generators)
                .map(|c| Arc::new(c) as Arc<dyn ImageGenerator>),
            synthesizer: non_empty(synthesizers).map(|c| Arc::new(c) as Arc<dyn Synthesizer>),
        })
    }
}

fn non_empty<S: ?Sized + Send + Sync>(chain: FallbackChain<S>) -> Option<FallbackChain<S>> {
    if chain.is_empty() {
        None
    } else {
        Some(chain)
    }
}

/// Turn a non-success response into [`ServiceError::HttpStatus`], or return
/// the body text.
///
/// # Errors
///
/// Returns `ServiceError::Request` on transport failure and
/// `ServiceError::HttpStatus` on a non-2xx status.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ServiceError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ServiceError::HttpStatus {
            status: status.as_u16(),
            body: shorten_error_body(&body),
        });
    }
    Ok(body)
}

fn shorten_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{shortened}...[truncated]");
    }
    collapsed
}
