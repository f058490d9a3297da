use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::config::{MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::core::context::PromptWindow;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};

/// Which of the two configured models serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn for_request(image_url: Option<&str>) -> Self {
        match image_url {
            Some(_) => Modality::Image,
            None => Modality::Text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),

    #[error("provider rate limit exceeded: {0}")]
    Throttled(String),

    #[error("provider failure: {0}")]
    Failure(String),
}

/// A single blocking round trip to the completion provider.
///
/// Implementations never retry; each call is exactly one attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        window: &PromptWindow,
        modality: Modality,
    ) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub text_model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub referer: String,
    pub title: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            text_model: "meta-llama/llama-3.1-8b-instruct".to_string(),
            vision_model: "google/gemini-pro-vision".to_string(),
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            timeout: Duration::from_secs(30),
            referer: "http://localhost:5000".to_string(),
            title: "Chatbot Platform".to_string(),
        }
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint (OpenRouter
/// by default).
pub struct OpenRouterClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenRouterClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model_for(&self, modality: Modality) -> &str {
        match modality {
            Modality::Text => &self.config.text_model,
            Modality::Image => &self.config.vision_model,
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<String, CompletionError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut req = self
            .client
            .post(url)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(request);

        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout(self.config.timeout)
            } else {
                CompletionError::Failure(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Throttled(body));
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Failure(format!("status {status}: {body}")));
        }

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| CompletionError::Failure(format!("malformed response: {e}")))?;

        debug!(
            generation_id = data.id.as_deref().unwrap_or("-"),
            model = data.model.as_deref().unwrap_or(request.model.as_str()),
            finish_reason = data.finish_reason().unwrap_or("-"),
            "Completion payload parsed"
        );

        data.first_content()
            .map(String::from)
            .ok_or_else(|| CompletionError::Failure("response carried no choices".to_string()))
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(
        &self,
        window: &PromptWindow,
        modality: Modality,
    ) -> Result<String, CompletionError> {
        let request = ChatCompletionRequest {
            model: self.model_for(modality).to_string(),
            messages: window.messages().to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        info!(
            model = %request.model,
            message_count = request.messages.len(),
            has_image = modality == Modality::Image,
            "Sending completion request"
        );

        let start = Instant::now();
        let result = match timeout(self.config.timeout, self.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.config.timeout)),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => info!(
                response_length = text.len(),
                elapsed_ms, "Completion response received"
            ),
            Err(e) => warn!(elapsed_ms, error = %e, "Completion request failed"),
        }

        result
    }
}
