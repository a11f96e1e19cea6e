use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerationOptions, GeneratorError, TextGenerator};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// A local Ollama model. Output shape is never enforced, so callers go
/// through best-effort parsing.
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports_schema(&self) -> bool {
        false
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String, GeneratorError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/api/generate", self.endpoint);
            let body = OllamaGenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: OllamaOptions {
                    temperature: options.temperature,
                    num_predict: options.max_output_tokens,
                },
            };

            let response = self
                .client
                .post(&url)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| GeneratorError::Transport(format!("Ollama request failed: {e}")))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(GeneratorError::Api {
                    status: 404,
                    message: format!("model not available: {}", self.model),
                });
            }
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(GeneratorError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: OllamaGenerateResponse = response
                .json()
                .await
                .map_err(|e| GeneratorError::MalformedResponse(e.to_string()))?;
            if parsed.response.trim().is_empty() {
                return Err(GeneratorError::EmptyResponse);
            }
            Ok(parsed.response)
        })
    }
}
