use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProviderError;
use crate::request::ImagePayload;

/// Model weight class. Light models serve high-volume checks, heavy models
/// serve image analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelClass {
    Light,
    Heavy,
}

/// Which configured provider answers a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRoute {
    /// Text-only clinical reasoning (symptoms, maternal risk, treatment, outbreak).
    Clinical,
    /// Imaging and acoustic screening (image analysis, TB, cough).
    Imaging,
}

impl fmt::Display for ProviderRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRoute::Clinical => f.write_str("clinical"),
            ProviderRoute::Imaging => f.write_str("imaging"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPair {
    pub light: String,
    pub heavy: String,
}

impl ModelPair {
    pub fn new(light: impl Into<String>, heavy: impl Into<String>) -> Self {
        Self {
            light: light.into(),
            heavy: heavy.into(),
        }
    }
}

/// Model identifiers per provider route and weight class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCatalog {
    pub clinical: ModelPair,
    pub imaging: ModelPair,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            clinical: ModelPair::new(
                "meta-llama/llama-3.1-8b-instruct",
                "meta-llama/llama-3.1-70b-instruct",
            ),
            imaging: ModelPair::new("llama3.1-8b", "llama3.1-70b"),
        }
    }
}

impl ModelCatalog {
    pub fn resolve(&self, route: ProviderRoute, class: ModelClass) -> &str {
        let pair = match route {
            ProviderRoute::Clinical => &self.clinical,
            ProviderRoute::Imaging => &self.imaging,
        };
        match class {
            ModelClass::Light => &pair.light,
            ModelClass::Heavy => &pair.heavy,
        }
    }
}

/// A fully specified provider call. Built once per request by the prompt
/// builder; clients only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceCall {
    system_instruction: String,
    user_prompt: String,
    route: ProviderRoute,
    model_class: ModelClass,
    model: String,
    max_output_tokens: u32,
    temperature: f64,
    image: Option<ImagePayload>,
}

impl InferenceCall {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        system_instruction: String,
        user_prompt: String,
        route: ProviderRoute,
        model_class: ModelClass,
        model: String,
        max_output_tokens: u32,
        temperature: f64,
        image: Option<ImagePayload>,
    ) -> Self {
        Self {
            system_instruction,
            user_prompt,
            route,
            model_class,
            model,
            max_output_tokens,
            temperature,
            image,
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }

    pub fn route(&self) -> ProviderRoute {
        self.route
    }

    pub fn model_class(&self) -> ModelClass {
        self.model_class
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }
}

/// Unparsed provider output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    pub latency: Duration,
}

impl RawCompletion {
    pub fn new(text: impl Into<String>, latency: Duration) -> Self {
        Self {
            text: text.into(),
            latency,
        }
    }
}

/// An external completion provider. Implementations must be safe to share
/// across concurrent requests and must not retry.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Short provider name used in logs and status reports.
    fn name(&self) -> &str;

    /// Whether the provider credential is present.
    fn is_configured(&self) -> bool {
        true
    }

    async fn invoke(&self, call: &InferenceCall) -> Result<RawCompletion, ProviderError>;
}

/// One client per provider route.
#[derive(Clone)]
pub struct ProviderSet {
    clinical: Arc<dyn InferenceClient>,
    imaging: Arc<dyn InferenceClient>,
}

impl ProviderSet {
    pub fn new(clinical: Arc<dyn InferenceClient>, imaging: Arc<dyn InferenceClient>) -> Self {
        Self { clinical, imaging }
    }

    /// Same client for both routes.
    pub fn single(client: Arc<dyn InferenceClient>) -> Self {
        Self {
            clinical: client.clone(),
            imaging: client,
        }
    }

    pub fn for_route(&self, route: ProviderRoute) -> &Arc<dyn InferenceClient> {
        match route {
            ProviderRoute::Clinical => &self.clinical,
            ProviderRoute::Imaging => &self.imaging,
        }
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        [ProviderRoute::Clinical, ProviderRoute::Imaging]
            .into_iter()
            .map(|route| {
                let client = self.for_route(route);
                ProviderStatus {
                    route,
                    provider: client.name().to_string(),
                    configured: client.is_configured(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub route: ProviderRoute,
    pub provider: String,
    pub configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_resolves_each_weight_class() {
        let catalog = ModelCatalog::default();
        assert_eq!(
            catalog.resolve(ProviderRoute::Imaging, ModelClass::Heavy),
            "llama3.1-70b"
        );
        assert_eq!(
            catalog.resolve(ProviderRoute::Imaging, ModelClass::Light),
            "llama3.1-8b"
        );
        assert_ne!(
            catalog.resolve(ProviderRoute::Clinical, ModelClass::Light),
            catalog.resolve(ProviderRoute::Clinical, ModelClass::Heavy)
        );
    }
}
