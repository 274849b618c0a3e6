//! Structured inference for clinical assistance.
//!
//! A [`ClinicalRequest`] is turned into an [`InferenceCall`] by the
//! [`PromptBuilder`], sent to an [`InferenceClient`], and the untrusted text
//! that comes back is recovered into a typed [`StructuredResult`] by
//! [`extract`]. Unusable model output never fails a request: the variant's
//! conservative fallback is returned instead and flagged.

pub mod batch;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod inference;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod request;
pub mod result;
pub mod schema;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::{BatchItemOutcome, BatchReport, run_batch};
pub use delivery::{Envelope, PushDispatcher, PushMessage, PushSink, failure_status};
pub use error::{DeliveryError, FlowError, ProviderError, Result, ValidationError};
pub use extract::{Extraction, FallbackReason, extract, extract_json_object};
pub use inference::{
    InferenceCall, InferenceClient, ModelCatalog, ModelClass, ModelPair, ProviderRoute,
    ProviderSet, ProviderStatus, RawCompletion,
};
pub use pipeline::{ClinicalPipeline, PipelineOutcome};
pub use prompt::{CallProfile, Language, PromptBuilder};
pub use registry::ConnectionRegistry;
pub use request::{ClinicalRequest, ImageModality, ImagePayload, Variant};
pub use result::StructuredResult;
pub use schema::ResultSchema;
