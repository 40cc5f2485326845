use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use relist_core::config::{LlmConfig, LlmProvider};
use relist_core::errors::GenerationError;

#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Ask the service for a strict JSON object response where the
    /// provider supports it; the prompt carries the shape contract.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn json(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), json_response: true }
    }
}

/// Seam to the generative-content service. Responses are advisory text;
/// callers validate shape before trusting anything in them.
#[async_trait]
pub trait ContentClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError>;
}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
pub fn payload_text(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else { return trimmed };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// HTTP client for the configured provider's completion endpoint.
pub struct HttpContentClient {
    http: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: Option<String>,
    model: String,
}

impl HttpContentClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GenerationError::Auth("api key is not configured".to_string()))
    }

    fn classify_status(status: StatusCode, body: &str) -> GenerationError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                GenerationError::Auth(format!("{status}: {body}"))
            }
            StatusCode::TOO_MANY_REQUESTS => GenerationError::Quota(format!("{status}: {body}")),
            _ => GenerationError::Transport(format!("{status}: {body}")),
        }
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: Value,
    ) -> Result<Value, GenerationError> {
        let mut request = self.http.post(url).json(&body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))
    }

    async fn complete_ollama(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| GenerationError::Transport("base url is not configured".to_string()))?;
        let url = format!("{}/api/generate", base.trim_end_matches('/'));

        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
        });
        if request.json_response {
            body["format"] = json!("json");
        }

        let payload = self.post(&url, &[], body).await?;
        payload["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GenerationError::MalformedResponse("missing `response` field".to_string()))
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let api_key = self.api_key()?.to_string();
        let base = self.base_url.as_deref().unwrap_or("https://api.openai.com");
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));

        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if request.json_response {
            body["response_format"] = json!({"type": "json_object"});
        }

        let headers = [("Authorization", format!("Bearer {api_key}"))];
        let payload = self.post(&url, &headers, body).await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::MalformedResponse("missing completion content".to_string())
            })
    }

    async fn complete_anthropic(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, GenerationError> {
        let api_key = self.api_key()?.to_string();
        let base = self.base_url.as_deref().unwrap_or("https://api.anthropic.com");
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));

        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let headers =
            [("x-api-key", api_key), ("anthropic-version", "2023-06-01".to_string())];
        let payload = self.post(&url, &headers, body).await?;
        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::MalformedResponse("missing message content".to_string())
            })
    }
}

#[async_trait]
impl ContentClient for HttpContentClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        match self.provider {
            LlmProvider::Ollama => self.complete_ollama(&request).await,
            LlmProvider::OpenAi => self.complete_openai(&request).await,
            LlmProvider::Anthropic => self.complete_anthropic(&request).await,
        }
    }
}

/// Deterministic stand-in for the content service, used by tests and the
/// smoke command. Responses are matched by a marker substring of the
/// prompt so each pipeline can be scripted independently.
#[derive(Default)]
pub struct ScriptedContentClient {
    scripts: Vec<(String, Result<String, GenerationError>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedContentClient {
    pub fn respond(mut self, marker: &str, response: &str) -> Self {
        self.scripts.push((marker.to_string(), Ok(response.to_string())));
        self
    }

    pub fn fail(mut self, marker: &str, error: GenerationError) -> Self {
        self.scripts.push((marker.to_string(), Err(error)));
        self
    }

    /// Prompts seen so far, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ContentClient for ScriptedContentClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        self.calls.lock().await.push(request.prompt.clone());

        for (marker, response) in &self.scripts {
            if request.prompt.contains(marker) {
                return response.clone();
            }
        }

        Err(GenerationError::MalformedResponse(format!(
            "no scripted response matches prompt starting `{}`",
            request.prompt.chars().take(60).collect::<String>()
        )))
    }
}
