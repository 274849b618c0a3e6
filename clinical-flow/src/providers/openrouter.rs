//! OpenRouter client built on `rig` agents.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{CompletionError, Prompt, PromptError};
use rig::providers::openrouter;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::inference::{InferenceCall, InferenceClient, RawCompletion};

pub struct OpenRouterClient {
    client: Option<openrouter::Client>,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(api_key: Option<&str>, timeout: Duration) -> Self {
        let client = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(openrouter::Client::new);
        Self { client, timeout }
    }
}

#[async_trait]
impl InferenceClient for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn invoke(&self, call: &InferenceCall) -> Result<RawCompletion, ProviderError> {
        let client = self.client.as_ref().ok_or(ProviderError::MissingCredential {
            provider: "openrouter",
        })?;
        if call.image().is_some() {
            warn!(model = call.model(), "Image attachments are not sent through OpenRouter");
        }

        let agent = client
            .agent(call.model())
            .preamble(call.system_instruction())
            .temperature(call.temperature())
            .max_tokens(u64::from(call.max_output_tokens()))
            .build();

        let started = Instant::now();
        let text = tokio::time::timeout(self.timeout, agent.prompt(call.user_prompt()))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .map_err(classify)?;
        let latency = started.elapsed();

        debug!(
            model = call.model(),
            latency_ms = latency.as_millis() as u64,
            "OpenRouter completion received"
        );
        Ok(RawCompletion::new(text, latency))
    }
}

fn classify(error: PromptError) -> ProviderError {
    let message = error.to_string();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("401") || lowered.contains("unauthorized") {
        return ProviderError::Authentication(message);
    }
    match error {
        PromptError::CompletionError(
            CompletionError::JsonError(_) | CompletionError::ResponseError(_),
        ) => ProviderError::MalformedResponse(message),
        _ => ProviderError::Network(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::request::{ClinicalRequest, SymptomCheck};

    #[tokio::test]
    async fn unconfigured_client_reports_missing_credential() {
        let client = OpenRouterClient::new(None, Duration::from_secs(1));
        assert!(!client.is_configured());

        let call = PromptBuilder::default().build(&ClinicalRequest::SymptomCheck(
            SymptomCheck::new("fever", "english"),
        ));
        let err = client.invoke(&call).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingCredential {
                provider: "openrouter"
            }
        ));
    }

    #[test]
    fn blank_key_is_treated_as_absent() {
        assert!(!OpenRouterClient::new(Some("   "), Duration::from_secs(1)).is_configured());
        assert!(OpenRouterClient::new(Some("sk-or-1"), Duration::from_secs(1)).is_configured());
    }
}
