//! Delivery of pipeline results to callers.
//!
//! Synchronous callers get an [`Envelope`]. Persistent connections get a
//! sequence of [`PushMessage`]s written to a [`PushSink`]; for each inbound
//! message [`PushDispatcher`] emits `processing` first and then exactly one
//! result or error.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{DeliveryError, FlowError, ProviderError, ValidationError};
use crate::pipeline::{ClinicalPipeline, PipelineOutcome};
use crate::request::{ClinicalRequest, SymptomCheck, VitalSigns, VitalSignsInput};

/// Response body shared by every synchronous endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filled_fields: Vec<String>,
    pub timestamp: String,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fallback_used: false,
            filled_fields: Vec::new(),
            timestamp: iso_timestamp(),
            extras: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            fallback_used: false,
            filled_fields: Vec::new(),
            timestamp: iso_timestamp(),
            extras: Map::new(),
        }
    }

    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        Self {
            fallback_used: outcome.used_fallback(),
            filled_fields: outcome.filled_fields.clone(),
            ..Self::ok(outcome.result.to_value())
        }
    }

    /// Adds a top-level field next to `data`, e.g. an echo of the input.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// HTTP-equivalent status for a pipeline failure.
pub fn failure_status(error: &FlowError) -> u16 {
    match error {
        FlowError::Validation(_) => 400,
        FlowError::Provider(ProviderError::Timeout(_)) => 504,
        FlowError::Provider(_) => 502,
    }
}

fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Message pushed over a persistent connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Connected {
        connection_id: String,
        message: String,
    },
    Processing {
        message: String,
    },
    /// Serialised with `type` set to the variant's result type tag.
    Result {
        result_type: &'static str,
        data: Value,
        fallback_used: bool,
        filled_fields: Vec<String>,
        timestamp: i64,
    },
    Error {
        message: String,
    },
    Pong {
        timestamp: i64,
    },
}

impl PushMessage {
    pub fn connected(connection_id: impl Into<String>) -> Self {
        PushMessage::Connected {
            connection_id: connection_id.into(),
            message: "Connected to Swasthya clinical assistant".to_string(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        PushMessage::Processing {
            message: message.into(),
        }
    }

    pub fn result(outcome: &PipelineOutcome) -> Self {
        PushMessage::Result {
            result_type: outcome.variant.result_type(),
            data: outcome.result.to_value(),
            fallback_used: outcome.used_fallback(),
            filled_fields: outcome.filled_fields.clone(),
            timestamp: epoch_millis(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PushMessage::Error {
            message: message.into(),
        }
    }

    pub fn pong() -> Self {
        PushMessage::Pong {
            timestamp: epoch_millis(),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            PushMessage::Connected { .. } => "connected",
            PushMessage::Processing { .. } => "processing",
            PushMessage::Result { result_type, .. } => *result_type,
            PushMessage::Error { .. } => "error",
            PushMessage::Pong { .. } => "pong",
        }
    }

    pub fn to_json(&self) -> Result<String, DeliveryError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for PushMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.message_type())?;
        match self {
            PushMessage::Connected {
                connection_id,
                message,
            } => {
                map.serialize_entry("connectionId", connection_id)?;
                map.serialize_entry("message", message)?;
            }
            PushMessage::Processing { message } | PushMessage::Error { message } => {
                map.serialize_entry("message", message)?;
            }
            PushMessage::Result {
                data,
                fallback_used,
                filled_fields,
                timestamp,
                ..
            } => {
                map.serialize_entry("data", data)?;
                if *fallback_used {
                    map.serialize_entry("fallback_used", &true)?;
                }
                if !filled_fields.is_empty() {
                    map.serialize_entry("filled_fields", filled_fields)?;
                }
                map.serialize_entry("timestamp", timestamp)?;
            }
            PushMessage::Pong { timestamp } => {
                map.serialize_entry("timestamp", timestamp)?;
            }
        }
        map.end()
    }
}

/// Destination for pushed messages, one per connection.
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn push(&self, message: PushMessage) -> Result<(), DeliveryError>;
}

#[async_trait]
impl PushSink for mpsc::Sender<PushMessage> {
    async fn push(&self, message: PushMessage) -> Result<(), DeliveryError> {
        self.send(message)
            .await
            .map_err(|_| DeliveryError::ChannelClosed)
    }
}

#[derive(Deserialize)]
struct SymptomMessage {
    symptoms: Option<String>,
    language: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaternalRiskMessage {
    vital_signs: Option<VitalSignsInput>,
}

/// Routes inbound connection messages to the pipeline.
#[derive(Clone)]
pub struct PushDispatcher {
    pipeline: ClinicalPipeline,
}

impl PushDispatcher {
    pub fn new(pipeline: ClinicalPipeline) -> Self {
        Self { pipeline }
    }

    /// Handles one inbound text frame. Only a closed sink is an error; every
    /// other failure is reported to the client as an `error` message.
    pub async fn handle_text<S>(&self, text: &str, sink: &S) -> Result<(), DeliveryError>
    where
        S: PushSink + ?Sized,
    {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Unparseable inbound message");
                return sink.push(PushMessage::error(e.to_string())).await;
            }
        };

        let message_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
        debug!(message_type, "Inbound message");

        match message_type {
            "ping" => sink.push(PushMessage::pong()).await,
            "analyze_symptoms" => {
                sink.push(PushMessage::processing("Analyzing symptoms..."))
                    .await?;
                let request = parse_symptoms(value);
                self.answer(request, sink).await
            }
            "maternal_risk" => {
                sink.push(PushMessage::processing("Assessing maternal health risk..."))
                    .await?;
                let request = parse_maternal_risk(value);
                self.answer(request, sink).await
            }
            _ => sink.push(PushMessage::error("Unknown message type")).await,
        }
    }

    async fn answer<S>(
        &self,
        request: Result<ClinicalRequest, ValidationError>,
        sink: &S,
    ) -> Result<(), DeliveryError>
    where
        S: PushSink + ?Sized,
    {
        let outcome = match request {
            Ok(request) => self.pipeline.run(&request).await,
            Err(e) => Err(FlowError::from(e)),
        };
        match outcome {
            Ok(outcome) => sink.push(PushMessage::result(&outcome)).await,
            Err(e) => {
                warn!(error = %e, "Push request failed");
                sink.push(PushMessage::error(e.to_string())).await
            }
        }
    }
}

fn parse_symptoms(value: Value) -> Result<ClinicalRequest, ValidationError> {
    let message: SymptomMessage = serde_json::from_value(value)
        .map_err(|e| ValidationError::invalid("message", e.to_string()))?;
    let symptoms = message
        .symptoms
        .ok_or(ValidationError::MissingField("symptoms"))?;
    let language = message.language.unwrap_or_else(|| "english".to_string());
    Ok(ClinicalRequest::SymptomCheck(SymptomCheck::new(
        symptoms, language,
    )))
}

fn parse_maternal_risk(value: Value) -> Result<ClinicalRequest, ValidationError> {
    let message: MaternalRiskMessage = serde_json::from_value(value)
        .map_err(|e| ValidationError::invalid("message", e.to_string()))?;
    let input = message
        .vital_signs
        .ok_or(ValidationError::MissingField("vitalSigns"))?;
    Ok(ClinicalRequest::MaternalRisk(VitalSigns::try_from(input)?))
}
