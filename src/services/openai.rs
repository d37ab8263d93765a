//! OpenAI-compatible HTTP client covering every collaborator capability.
//!
//! Uses `/chat/completions`, `/audio/transcriptions` (multipart),
//! `/images/generations` (`b64_json`) and `/audio/speech`. Any server that
//! speaks the same API (a local gateway, a proxy) works via `base_url`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenAiServiceConfig;
use crate::message::Media;

use super::{
    check_http_response, Answer, Answerer, GeneratedImage, ImageGenerator, ServiceError,
    Synthesizer, Transcriber, Transcript,
};

const MAX_ANSWER_TOKENS: u32 = 1024;
const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiServiceConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client from its config section and resolved API key.
    pub fn new(config: OpenAiServiceConfig, api_key: String) -> Self {
        Self {
            config,
            api_key,
            client: crate::transport::http_client(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn cost(&self, usage: Option<(u32, u32)>) -> f64 {
        let Some((prompt_tokens, completion_tokens)) = usage else {
            return 0.0;
        };
        let input = f64::from(prompt_tokens);
        let output = f64::from(completion_tokens);
        (input * self.config.input_cost_per_mtok + output * self.config.output_cost_per_mtok)
            / TOKENS_PER_PRICE_UNIT
    }
}

/// Parse a chat completion body into the answer text and
/// `(prompt_tokens, completion_tokens)` usage.
///
/// # Errors
///
/// Returns `ServiceError::Parse` for malformed bodies and `ServiceError::Empty`
/// when the first choice has no text.
#[doc(hidden)]
pub fn parse_chat_response(body: &str) -> Result<(String, Option<(u32, u32)>), ServiceError> {
    let resp: ChatResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Parse(e.to_string()))?;
    let usage = resp.usage.as_ref().map(|u| {
        (
            u.prompt_tokens.unwrap_or(0),
            u.completion_tokens.unwrap_or(0),
        )
    });
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ServiceError::Empty("no answer text".to_owned()))?;
    Ok((text, usage))
}

/// Decode an image generation body.
///
/// # Errors
///
/// Returns `ServiceError::Parse` for malformed bodies or invalid base64, and
/// `ServiceError::Empty` if no image was returned.
#[doc(hidden)]
pub fn parse_images_response(body: &str) -> Result<Vec<GeneratedImage>, ServiceError> {
    let resp: ImagesResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Parse(e.to_string()))?;
    let mut images = Vec::new();
    for (index, data) in resp.data.into_iter().enumerate() {
        let Some(encoded) = data.b64_json else {
            continue;
        };
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| ServiceError::Parse(format!("invalid image encoding: {e}")))?;
        images.push(GeneratedImage {
            file_name: format!("image_{}.png", index.saturating_add(1)),
            bytes,
        });
    }
    if images.is_empty() {
        return Err(ServiceError::Empty("no images returned".to_owned()));
    }
    Ok(images)
}

#[async_trait]
impl Answerer for OpenAiClient {
    async fn answer(&self, prompt: &str) -> Result<Answer, ServiceError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_ANSWER_TOKENS,
        };
        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        let (text, usage) = parse_chat_response(&body)?;
        let cost = self.cost(usage);
        debug!(model = %self.config.chat_model, cost, "answer received");
        Ok(Answer { text, cost })
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &Media) -> Result<Transcript, ServiceError> {
        let file_name = audio
            .file_name
            .clone()
            .unwrap_or_else(|| "audio.ogg".to_owned());
        let part = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name(file_name)
            .mime_str(&audio.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "verbose_json")
            .part("file", part);

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        let resp: TranscriptionResponse =
            serde_json::from_str(&body).map_err(|e| ServiceError::Parse(e.to_string()))?;
        Ok(Transcript::new(resp.text.trim(), resp.language))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedImage>, ServiceError> {
        let request = serde_json::json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "response_format": "b64_json",
        });
        let response = self
            .client
            .post(self.url("images/generations"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        parse_images_response(&body)
    }
}

#[async_trait]
impl Synthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ServiceError> {
        // The speech endpoint detects the language from the input text.
        debug!(language, "synthesizing speech");
        let request = serde_json::json!({
            "model": self.config.speech_model,
            "input": text,
            "voice": self.config.voice,
            "response_format": "mp3",
        });
        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::HttpStatus {
                status: status.as_u16(),
                body: super::shorten_error_body(&body),
            });
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::Empty("no audio returned".to_owned()));
        }
        Ok(bytes.to_vec())
    }
}
