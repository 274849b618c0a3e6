use clinical_flow::providers::ChatCompletionsClient;
use clinical_flow::providers::chat_completions::CEREBRAS_BASE_URL;
use clinical_flow::{ModelCatalog, ModelPair, ProviderError, ProviderSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[cfg(feature = "rig")]
use clinical_flow::providers::OpenRouterClient;

/// Limits applied to uploaded images before they reach a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub bind_addr: String,
    pub cerebras_api_key: Option<String>,
    pub cerebras_base_url: String,
    pub openrouter_api_key: Option<String>,
    pub models: ModelCatalog,
    pub provider_timeout: Duration,
    pub batch_limit: usize,
    pub max_upload_bytes: usize,
    pub image: ImageSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_addr: "0.0.0.0".to_string(),
            cerebras_api_key: None,
            cerebras_base_url: CEREBRAS_BASE_URL.to_string(),
            openrouter_api_key: None,
            models: ModelCatalog::default(),
            provider_timeout: Duration::from_secs(60),
            batch_limit: 100,
            max_upload_bytes: 50 * 1024 * 1024,
            image: ImageSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparseable values are
    /// logged and replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let models = ModelCatalog {
            clinical: ModelPair::new(
                text("CLINICAL_LIGHT_MODEL").unwrap_or(defaults.models.clinical.light.clone()),
                text("CLINICAL_HEAVY_MODEL").unwrap_or(defaults.models.clinical.heavy.clone()),
            ),
            imaging: ModelPair::new(
                text("IMAGING_LIGHT_MODEL").unwrap_or(defaults.models.imaging.light.clone()),
                text("IMAGING_HEAVY_MODEL").unwrap_or(defaults.models.imaging.heavy.clone()),
            ),
        };

        Self {
            port: parsed(&text, "PORT", defaults.port),
            bind_addr: text("BIND_ADDR").unwrap_or(defaults.bind_addr),
            cerebras_api_key: text("CEREBRAS_API_KEY"),
            cerebras_base_url: text("CEREBRAS_BASE_URL").unwrap_or(defaults.cerebras_base_url),
            openrouter_api_key: text("OPENROUTER_API_KEY"),
            models,
            provider_timeout: Duration::from_secs(parsed(
                &text,
                "PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout.as_secs(),
            )),
            batch_limit: parsed(&text, "BATCH_LIMIT", defaults.batch_limit),
            max_upload_bytes: parsed(&text, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            image: ImageSettings {
                max_dimension: parsed(&text, "IMAGE_MAX_DIMENSION", defaults.image.max_dimension),
                jpeg_quality: parsed(&text, "IMAGE_JPEG_QUALITY", defaults.image.jpeg_quality)
                    .clamp(1, 100),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Names of the credential variables that are not set.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.cerebras_api_key.is_none() {
            missing.push("CEREBRAS_API_KEY");
        }
        if self.openrouter_api_key.is_none() {
            missing.push("OPENROUTER_API_KEY");
        }
        missing
    }

    /// Clinical text goes to OpenRouter, imaging and acoustic screening to
    /// the Cerebras chat-completions endpoint. Without the `rig` feature both
    /// routes use the chat-completions client.
    pub fn provider_set(&self) -> Result<ProviderSet, ProviderError> {
        let imaging = Arc::new(ChatCompletionsClient::new(
            "cerebras",
            self.cerebras_base_url.clone(),
            self.cerebras_api_key.clone(),
            self.provider_timeout,
        )?);

        #[cfg(feature = "rig")]
        let clinical = Arc::new(OpenRouterClient::new(
            self.openrouter_api_key.as_deref(),
            self.provider_timeout,
        ));
        #[cfg(not(feature = "rig"))]
        let clinical = Arc::new(ChatCompletionsClient::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            self.openrouter_api_key.clone(),
            self.provider_timeout,
        )?);

        Ok(ProviderSet::new(clinical, imaging))
    }
}

fn parsed<T, F>(text: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match text(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServiceConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config(&[]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.batch_limit, 100);
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!(config.image, ImageSettings::default());
        assert_eq!(
            config.missing_credentials(),
            ["CEREBRAS_API_KEY", "OPENROUTER_API_KEY"]
        );
    }

    #[test]
    fn values_override_defaults() {
        let config = config(&[
            ("PORT", "8080"),
            ("CEREBRAS_API_KEY", "csk-1"),
            ("IMAGING_HEAVY_MODEL", "llama-4-scout"),
            ("PROVIDER_TIMEOUT_SECS", "5"),
            ("IMAGE_JPEG_QUALITY", "250"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.models.imaging.heavy, "llama-4-scout");
        assert_eq!(config.models.imaging.light, "llama3.1-8b");
        assert_eq!(config.provider_timeout, Duration::from_secs(5));
        assert_eq!(config.missing_credentials(), ["OPENROUTER_API_KEY"]);
        assert_eq!(config.image.jpeg_quality, 100);
    }

    #[test]
    fn garbage_and_blank_values_fall_back() {
        let config = config(&[("PORT", "eighty"), ("OPENROUTER_API_KEY", "   ")]);
        assert_eq!(config.port, 3001);
        assert!(config.openrouter_api_key.is_none());
    }

    #[test]
    fn provider_set_reports_configuration() {
        let config = config(&[("CEREBRAS_API_KEY", "csk-1")]);
        let status = config.provider_set().unwrap().status();

        let imaging = status
            .iter()
            .find(|s| s.provider == "cerebras")
            .unwrap();
        assert!(imaging.configured);
        assert!(status.iter().any(|s| !s.configured));
    }
}
