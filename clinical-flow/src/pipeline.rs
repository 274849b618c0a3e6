//! `ClinicalPipeline` runs one request through every stage: validate, build
//! the prompt, pick the provider for the variant, invoke it, extract.
//!
//! The pipeline holds no per-request state. Build it once at startup and
//! share it (it is cheap to clone) across handlers and connection tasks.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::extract::{FallbackReason, extract};
use crate::inference::ProviderSet;
use crate::prompt::PromptBuilder;
use crate::request::{ClinicalRequest, Variant};
use crate::result::StructuredResult;

/// What a successful pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub variant: Variant,
    pub result: StructuredResult,
    /// Set when the model output was unusable and the fallback was returned.
    pub fallback: Option<FallbackReason>,
    /// Optional fields the model omitted, filled with neutral values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filled_fields: Vec<String>,
    pub model: String,
    #[serde(with = "millis")]
    pub latency: Duration,
}

impl PipelineOutcome {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Clone)]
pub struct ClinicalPipeline {
    builder: PromptBuilder,
    providers: ProviderSet,
}

impl ClinicalPipeline {
    pub fn new(builder: PromptBuilder, providers: ProviderSet) -> Self {
        Self { builder, providers }
    }

    pub fn builder(&self) -> &PromptBuilder {
        &self.builder
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub async fn run(&self, request: &ClinicalRequest) -> Result<PipelineOutcome> {
        request.validate()?;

        let variant = request.variant();
        let call = self.builder.build(request);
        let client = self.providers.for_route(call.route());

        info!(
            variant = %variant,
            provider = client.name(),
            model = call.model(),
            "Invoking provider"
        );

        let raw = client.invoke(&call).await.inspect_err(|e| {
            warn!(variant = %variant, provider = client.name(), error = %e, "Provider call failed");
        })?;

        let extraction = extract(&raw, variant);
        info!(
            variant = %variant,
            latency_ms = raw.latency.as_millis() as u64,
            fallback = extraction.used_fallback(),
            filled = extraction.filled_fields.len(),
            "Pipeline completed"
        );

        Ok(PipelineOutcome {
            variant,
            result: extraction.result,
            fallback: extraction.fallback,
            filled_fields: extraction.filled_fields,
            model: call.model().to_string(),
            latency: raw.latency,
        })
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
