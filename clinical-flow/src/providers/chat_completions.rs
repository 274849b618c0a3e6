//! OpenAI-compatible `chat/completions` client over `reqwest`.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::ProviderError;
use crate::inference::{InferenceCall, InferenceClient, RawCompletion};

pub const CEREBRAS_BASE_URL: &str = "https://api.cerebras.ai/v1";

pub struct ChatCompletionsClient {
    provider: &'static str,
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            provider,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        })
    }

    pub fn cerebras(api_key: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Self::new("cerebras", CEREBRAS_BASE_URL, api_key, timeout)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn payload(&self, call: &InferenceCall) -> Value {
        let user_content = match call.image() {
            Some(image) => json!([
                { "type": "text", "text": call.user_prompt() },
                {
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.bytes))
                    }
                }
            ]),
            None => Value::String(call.user_prompt().to_string()),
        };

        json!({
            "model": call.model(),
            "messages": [
                { "role": "system", "content": call.system_instruction() },
                { "role": "user", "content": user_content }
            ],
            "max_tokens": call.max_output_tokens(),
            "temperature": call.temperature()
        })
    }

    fn classify(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else if error.is_decode() {
            ProviderError::MalformedResponse(error.to_string())
        } else {
            ProviderError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl InferenceClient for ChatCompletionsClient {
    fn name(&self) -> &str {
        self.provider
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn invoke(&self, call: &InferenceCall) -> Result<RawCompletion, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential {
                provider: self.provider,
            })?;

        let started = Instant::now();
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.payload(call))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, body));
        }

        let body: Value = response.json().await.map_err(|e| self.classify(e))?;
        let text = completion_text(&body)?;
        let latency = started.elapsed();

        debug!(
            provider = self.provider,
            model = call.model(),
            latency_ms = latency.as_millis() as u64,
            "Completion received"
        );
        Ok(RawCompletion::new(text, latency))
    }
}

fn rejection(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(body),
        _ => ProviderError::Rejected {
            status: status.as_u16(),
            body,
        },
    }
}

fn completion_text(body: &Value) -> Result<String, ProviderError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
