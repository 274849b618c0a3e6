use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        rejection::{JsonRejection, QueryRejection},
        multipart::MultipartRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use clinical_flow::request::ImageStudy;
use clinical_flow::{
    ClinicalPipeline, ClinicalRequest, ConnectionRegistry, Envelope, FlowError, ImageModality,
    ImagePayload, PromptBuilder, ProviderError, ProviderSet, PushDispatcher, ValidationError,
    failure_status, run_batch,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::imaging::{ImagePreprocessor, PreprocessError, ResizingPreprocessor, is_allowed_mime};
use crate::models::{
    AnalyticsQuery, BatchFileResult, BatchResponse, CoughRequest, DashboardAnalytics,
    MaternalRiskRequest, OutbreakRequest, SymptomCheckerRequest, TreatmentPlanRequest,
};
use crate::ws::ws_handler;

type ApiResult = Result<Json<Envelope>, ApiError>;

/// Every failure a handler can report, rendered as a `{success: false}` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Flow(e) => StatusCode::from_u16(failure_status(e))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Preprocess(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::Flow(FlowError::Validation(error))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(Envelope::failure(self.to_string()))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ClinicalPipeline,
    pub dispatcher: PushDispatcher,
    pub registry: ConnectionRegistry,
    pub preprocessor: Arc<dyn ImagePreprocessor>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        providers: ProviderSet,
        preprocessor: Arc<dyn ImagePreprocessor>,
    ) -> Self {
        let pipeline = ClinicalPipeline::new(PromptBuilder::new(config.models.clone()), providers);
        Self {
            dispatcher: PushDispatcher::new(pipeline.clone()),
            pipeline,
            registry: ConnectionRegistry::new(),
            preprocessor,
            config: Arc::new(config),
        }
    }

    pub fn from_config(config: ServiceConfig) -> Result<Self, ProviderError> {
        let providers = config.provider_set()?;
        let preprocessor = Arc::new(ResizingPreprocessor::new(config.image));
        Ok(Self::new(config, providers, preprocessor))
    }
}

pub fn create_app(config: ServiceConfig) -> Result<Router, ProviderError> {
    Ok(build_router(AppState::from_config(config)?))
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .route("/api/providers", get(provider_status))
        .route("/api/analyze-image", post(analyze_image))
        .route("/api/detect-tb", post(detect_tb))
        .route("/api/analyze-cough", post(analyze_cough))
        .route("/api/maternal-risk-assessment", post(maternal_risk))
        .route("/api/symptom-checker", post(symptom_checker))
        .route("/api/treatment-plan", post(treatment_plan))
        .route("/api/predict-outbreak", post(predict_outbreak))
        .route("/api/batch-analyze", post(batch_analyze))
        .route("/api/dashboard-analytics", get(dashboard_analytics))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn run_pipeline(state: &AppState, request: ClinicalRequest) -> Result<Envelope, ApiError> {
    let outcome = state.pipeline.run(&request).await?;
    Ok(Envelope::from_outcome(&outcome))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "connections": state.registry.count(),
        "services": {
            "cerebras": state.config.cerebras_api_key.is_some(),
            "openrouter": state.config.openrouter_api_key.is_some()
        }
    }))
}

async fn provider_status(State(state): State<AppState>) -> ApiResult {
    let data = json!({
        "providers": state.pipeline.providers().status(),
        "models": state.pipeline.builder().catalog(),
    });
    Ok(Json(Envelope::ok(data)))
}

async fn symptom_checker(
    State(state): State<AppState>,
    body: Result<Json<SymptomCheckerRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    info!(language = body.language(), "Symptom analysis");

    let envelope = run_pipeline(&state, body.to_request()?).await?;
    Ok(Json(envelope.with_extra("input", body.echo())))
}

async fn maternal_risk(
    State(state): State<AppState>,
    body: Result<Json<MaternalRiskRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    info!("Maternal health risk assessment");

    let mut envelope = run_pipeline(&state, body.to_request()?).await?;
    if let Some(patient_info) = body.patient_info {
        envelope = envelope.with_extra("patientInfo", patient_info);
    }
    Ok(Json(envelope))
}

async fn treatment_plan(
    State(state): State<AppState>,
    body: Result<Json<TreatmentPlanRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    info!("Generating treatment plan");
    Ok(Json(run_pipeline(&state, body.into_request()?).await?))
}

async fn predict_outbreak(
    State(state): State<AppState>,
    body: Result<Json<OutbreakRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    info!("Predicting disease outbreak");
    Ok(Json(run_pipeline(&state, body.into_request()?).await?))
}

async fn analyze_cough(
    State(state): State<AppState>,
    body: Result<Json<CoughRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    info!("Analyzing cough sound");
    Ok(Json(run_pipeline(&state, body.into_request()?).await?))
}

async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut form = read_form(multipart?, "image").await?;
    let file = form
        .files
        .pop()
        .ok_or_else(|| ApiError::BadRequest("No image uploaded".to_string()))?;

    let modality = match form.fields.get("imageType") {
        Some(raw) => raw.parse::<ImageModality>()?,
        None => ImageModality::default(),
    };
    info!(file_name = %file.file_name, modality = modality.as_str(), "Analyzing medical image");

    let file_name = file.file_name.clone();
    let file_size = file.payload.bytes.len();
    let image = state.preprocessor.prepare(file.payload).await?;
    let envelope = run_pipeline(
        &state,
        ClinicalRequest::ImageAnalysis(ImageStudy { image, modality }),
    )
    .await?;

    Ok(Json(
        envelope
            .with_extra("fileName", file_name)
            .with_extra("fileSize", file_size),
    ))
}

async fn detect_tb(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut form = read_form(multipart?, "xray").await?;
    let file = form
        .files
        .pop()
        .ok_or_else(|| ApiError::BadRequest("No X-ray uploaded".to_string()))?;
    info!(file_name = %file.file_name, "TB screening");

    let image = state.preprocessor.prepare(file.payload).await?;
    Ok(Json(
        run_pipeline(&state, ClinicalRequest::TbScreen(image)).await?,
    ))
}

async fn batch_analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let form = read_form(multipart?, "images").await?;
    if form.files.is_empty() {
        return Err(ApiError::BadRequest("No images uploaded".to_string()));
    }
    info!(files = form.files.len(), "Batch screening");

    let items = form
        .files
        .into_iter()
        .map(|file| (file.file_name, file.payload))
        .collect();

    let report = run_batch(items, state.config.batch_limit, |payload| {
        let state = state.clone();
        async move {
            let image = state
                .preprocessor
                .prepare(payload)
                .await
                .map_err(|e| e.to_string())?;
            state
                .pipeline
                .run(&ClinicalRequest::TbScreen(image))
                .await
                .map_err(|e| e.to_string())
        }
    })
    .await?;

    let results = report
        .outcomes
        .into_iter()
        .map(|outcome| BatchFileResult {
            file_name: outcome.identifier,
            success: outcome.success,
            fallback_used: outcome.result.as_ref().map(|r| r.used_fallback()),
            filled_fields: outcome
                .result
                .as_ref()
                .map(|r| r.filled_fields.clone())
                .unwrap_or_default(),
            analysis: outcome.result.map(|r| r.result.to_value()),
            error: outcome.error,
        })
        .collect();

    Ok(Json(BatchResponse {
        success: true,
        total_processed: report.total,
        success_count: report.success_count,
        fail_count: report.fail_count,
        results,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn dashboard_analytics(
    State(state): State<AppState>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let analytics = DashboardAnalytics::sample(state.registry.count());
    let data = serde_json::to_value(analytics).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(
        Envelope::ok(data)
            .with_extra("timeRange", query.time_range)
            .with_extra("region", query.region),
    ))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

struct UploadedFile {
    file_name: String,
    payload: ImagePayload,
}

#[derive(Default)]
struct UploadForm {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

/// Collects every file uploaded under `file_field` plus the plain text fields.
async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let bad_upload = |e: axum::extract::multipart::MultipartError| {
        ApiError::BadRequest(format!("File upload error: {}", e.body_text()))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let mime_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
            if !is_allowed_mime(&mime_type) {
                return Err(ApiError::BadRequest(
                    "Invalid file type. Only JPEG, PNG, and DICOM allowed.".to_string(),
                ));
            }
            let bytes = field.bytes().await.map_err(bad_upload)?;
            form.files.push(UploadedFile {
                file_name,
                payload: ImagePayload::new(mime_type, bytes.to_vec()),
            });
        } else {
            let value = field.text().await.map_err(bad_upload)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}
