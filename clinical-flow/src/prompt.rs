//! Turns a [`ClinicalRequest`] into an [`InferenceCall`].
//!
//! Building is total: any request that passed validation produces a call.
//! Each prompt ends with the variant's rendered [`ResultSchema`] so the model
//! is told the exact field names and value domains the extractor will accept.

use std::fmt::Write;

use crate::inference::{InferenceCall, ModelCatalog, ModelClass, ProviderRoute};
use crate::request::{
    AudioFeatures, ClinicalRequest, ImageStudy, OutbreakData, SymptomCheck, TreatmentRequest,
    Variant, VitalSigns,
};
use crate::schema::ResultSchema;

const UNSPECIFIED: &str = "unspecified";

/// Languages the symptom checker can answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Tamil,
    Telugu,
    Bengali,
}

impl Language {
    /// Resolves a client language code. Unknown codes fall back to English.
    pub fn resolve(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "hindi" | "hi" => Language::Hindi,
            "tamil" | "ta" => Language::Tamil,
            "telugu" | "te" => Language::Telugu,
            "bengali" | "bn" => Language::Bengali,
            _ => Language::English,
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Language::English => "Respond in English.",
            Language::Hindi => "हिंदी में जवाब दें।",
            Language::Tamil => "தமிழில் பதிலளிக்கவும்.",
            Language::Telugu => "తెలుగులో సమాధానం ఇవ్వండి.",
            Language::Bengali => "বাংলায় উত্তর দিন।",
        }
    }
}

/// Provider, model class and sampling settings for a variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallProfile {
    pub route: ProviderRoute,
    pub model_class: ModelClass,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub system_instruction: &'static str,
}

impl CallProfile {
    pub fn for_variant(variant: Variant) -> Self {
        let (route, model_class, max_output_tokens, temperature, system_instruction) =
            match variant {
                Variant::SymptomCheck => (
                    ProviderRoute::Clinical,
                    ModelClass::Light,
                    2000,
                    0.3,
                    "You are a knowledgeable and empathetic Indian doctor. Always respond with valid JSON only.",
                ),
                Variant::MaternalRisk => (
                    ProviderRoute::Clinical,
                    ModelClass::Light,
                    2000,
                    0.3,
                    "You are an expert in maternal health. Always respond with valid JSON only.",
                ),
                Variant::TreatmentPlan => (
                    ProviderRoute::Clinical,
                    ModelClass::Light,
                    1500,
                    0.3,
                    "You are a primary-care physician planning affordable treatment. Always respond with valid JSON only.",
                ),
                Variant::OutbreakPrediction => (
                    ProviderRoute::Clinical,
                    ModelClass::Light,
                    1200,
                    0.2,
                    "You are an epidemiologist monitoring disease surveillance data. Always respond with valid JSON only.",
                ),
                Variant::ImageAnalysis => (
                    ProviderRoute::Imaging,
                    ModelClass::Heavy,
                    3000,
                    0.2,
                    "You are an expert medical AI radiologist with 20+ years of experience. Provide accurate, detailed medical analysis. Always respond with valid JSON only.",
                ),
                Variant::TbScreen => (
                    ProviderRoute::Imaging,
                    ModelClass::Light,
                    1500,
                    0.1,
                    "You are a TB detection specialist. Respond with valid JSON only.",
                ),
                Variant::CoughAnalysis => (
                    ProviderRoute::Imaging,
                    ModelClass::Light,
                    1000,
                    0.2,
                    "You are a respiratory disease specialist. Respond with JSON only.",
                ),
            };
        Self {
            route,
            model_class,
            max_output_tokens,
            temperature,
            system_instruction,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    catalog: ModelCatalog,
}

impl PromptBuilder {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn build(&self, request: &ClinicalRequest) -> InferenceCall {
        let variant = request.variant();
        let profile = CallProfile::for_variant(variant);

        let body = match request {
            ClinicalRequest::SymptomCheck(check) => symptom_prompt(check),
            ClinicalRequest::MaternalRisk(vitals) => maternal_prompt(vitals),
            ClinicalRequest::TreatmentPlan(plan) => treatment_prompt(plan),
            ClinicalRequest::OutbreakPrediction(data) => outbreak_prompt(data),
            ClinicalRequest::ImageAnalysis(study) => image_prompt(study),
            ClinicalRequest::TbScreen(_) => tb_prompt(),
            ClinicalRequest::CoughAnalysis(features) => cough_prompt(features),
        };
        let user_prompt = with_response_contract(body, variant, trailer(request));

        InferenceCall::new(
            profile.system_instruction.to_string(),
            user_prompt,
            profile.route,
            profile.model_class,
            self.catalog
                .resolve(profile.route, profile.model_class)
                .to_string(),
            profile.max_output_tokens,
            profile.temperature,
            request.image().cloned(),
        )
    }
}

/// Appends the JSON template, the required-field list and any closing note.
fn with_response_contract(mut prompt: String, variant: Variant, trailer: Option<String>) -> String {
    let schema = ResultSchema::for_variant(variant);
    let required = schema.required_fields().collect::<Vec<_>>().join(", ");

    let _ = write!(
        prompt,
        "\n\nRespond with a single JSON object in exactly this format:\n{}\n\n\
         Use only the field names shown. Where several values are separated by '/', choose exactly one of them. \
         Numeric ranges give the allowed minimum and maximum. \
         These fields must always be present: {}.",
        schema.render_template(),
        required
    );
    if let Some(trailer) = trailer {
        prompt.push_str("\n\n");
        prompt.push_str(&trailer);
    }
    prompt
}

fn trailer(request: &ClinicalRequest) -> Option<String> {
    match request {
        ClinicalRequest::SymptomCheck(check) => Some(format!(
            "{}\nFocus on diseases common in India. Be empathetic and clear.",
            Language::resolve(&check.language).instruction()
        )),
        ClinicalRequest::MaternalRisk(_) => {
            Some("Base analysis on Indian maternal health guidelines (WHO + FOGSI).".to_string())
        }
        ClinicalRequest::TreatmentPlan(_) => {
            Some("Prioritize affordable, locally available treatments.".to_string())
        }
        ClinicalRequest::OutbreakPrediction(_) => Some(
            "Consider Indian epidemiology patterns (monsoon diseases, etc).".to_string(),
        ),
        ClinicalRequest::ImageAnalysis(_) => Some(
            "Be extremely thorough and medically accurate. If nothing abnormal is found, say so clearly."
                .to_string(),
        ),
        ClinicalRequest::TbScreen(_) | ClinicalRequest::CoughAnalysis(_) => None,
    }
}

fn symptom_prompt(check: &SymptomCheck) -> String {
    format!(
        "You are an experienced Indian doctor providing medical consultation.\n\n\
         Patient Symptoms: {}\n\n\
         Provide a comprehensive medical assessment including a differential diagnosis, \
         follow-up questions, immediate advice, safe home remedies and recommended tests.",
        check.symptoms.trim()
    )
}

fn maternal_prompt(vitals: &VitalSigns) -> String {
    format!(
        "You are a maternal health specialist. Analyze these vital signs for pregnancy complications and also disease.\n\n\
         Patient Data:\n\
         - Blood Pressure: {}/{} mmHg\n\
         - Weight: {} kg\n\
         - Hemoglobin: {} g/dL\n\
         - Blood Glucose: {} mg/dL\n\
         - Gestational Age: {} weeks\n\
         - Previous Pregnancies: {}\n\n\
         Provide a risk assessment.",
        vitals.blood_pressure.systolic,
        vitals.blood_pressure.diastolic,
        vitals.weight_kg,
        vitals.hemoglobin_g_dl,
        vitals.glucose_mg_dl,
        vitals.gestational_age_weeks,
        vitals.previous_pregnancies
    )
}

fn treatment_prompt(plan: &TreatmentRequest) -> String {
    let profile = &plan.profile;
    let age = profile
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| UNSPECIFIED.to_string());

    format!(
        "Create a detailed treatment plan for an Indian patient.\n\n\
         Diagnosis: {}\n\
         Patient Age: {}\n\
         Location: {} (Rural/Urban)\n\
         Economic Status: {}",
        plan.diagnosis.trim(),
        age,
        text_or_unspecified(profile.location.as_deref()),
        text_or_unspecified(profile.economic_status.as_deref())
    )
}

fn outbreak_prompt(data: &OutbreakData) -> String {
    let cases = if data.recent_cases.is_empty() {
        "none reported".to_string()
    } else {
        data.recent_cases
            .iter()
            .map(|c| format!("{}: {}", c.disease, c.count))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let symptoms = if data.symptoms.is_empty() {
        "none reported".to_string()
    } else {
        data.symptoms.join(", ")
    };

    format!(
        "Analyze disease outbreak risk for an Indian region.\n\n\
         Data:\n\
         - Region: {}\n\
         - Recent Cases: {}\n\
         - Common Symptoms: {}\n\
         - Season: {}\n\
         - Temperature: {}°C\n\n\
         Predict the outbreak risk.",
        data.region, cases, symptoms, data.season, data.temperature_c
    )
}

fn image_prompt(study: &ImageStudy) -> String {
    let modality = study.modality.as_str();
    format!(
        "You are an expert radiologist AI. Analyze this {modality} medical image and provide a comprehensive diagnosis.\n\n\
         Image Type: {modality}"
    )
}

fn tb_prompt() -> String {
    "Analyze this chest X-ray SPECIFICALLY for Tuberculosis (TB) indicators.\n\n\
     Look for:\n\
     - Cavitary lesions in upper lobes\n\
     - Infiltrates and consolidations\n\
     - Pleural effusion\n\
     - Lymphadenopathy\n\
     - Fibrosis patterns"
        .to_string()
}

fn cough_prompt(features: &AudioFeatures) -> String {
    format!(
        "Analyze this cough sound data for respiratory disease detection.\n\n\
         Audio Features:\n\
         - Duration: {}ms\n\
         - Frequency: {}Hz\n\
         - Intensity: {}\n\
         - Pattern: {}",
        features.duration_ms, features.frequency_hz, features.intensity, features.pattern
    )
}

fn text_or_unspecified(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => UNSPECIFIED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{
        BloodPressure, CaseCount, ImageModality, ImagePayload, PatientProfile,
    };

    fn all_requests() -> Vec<ClinicalRequest> {
        let image = ImagePayload::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]);
        vec![
            ClinicalRequest::SymptomCheck(SymptomCheck::new("fever and cough", "english")),
            ClinicalRequest::MaternalRisk(VitalSigns {
                blood_pressure: BloodPressure {
                    systolic: 190,
                    diastolic: 120,
                },
                weight_kg: 65.0,
                hemoglobin_g_dl: 8.0,
                glucose_mg_dl: 250.0,
                gestational_age_weeks: 32,
                previous_pregnancies: 1,
            }),
            ClinicalRequest::TreatmentPlan(TreatmentRequest {
                diagnosis: "Typhoid".to_string(),
                profile: PatientProfile::default(),
            }),
            ClinicalRequest::OutbreakPrediction(OutbreakData {
                region: "Kerala".to_string(),
                recent_cases: vec![CaseCount {
                    disease: "Dengue".to_string(),
                    count: 42,
                }],
                symptoms: vec!["fever".to_string(), "rash".to_string()],
                season: "monsoon".to_string(),
                temperature_c: 31.0,
            }),
            ClinicalRequest::ImageAnalysis(ImageStudy {
                image: image.clone(),
                modality: ImageModality::Ct,
            }),
            ClinicalRequest::TbScreen(image),
            ClinicalRequest::CoughAnalysis(AudioFeatures {
                duration_ms: 850.0,
                frequency_hz: 420.0,
                intensity: 0.7,
                pattern: "wet".to_string(),
            }),
        ]
    }

    #[test]
    fn every_variant_builds_a_call_with_its_schema() {
        let builder = PromptBuilder::default();
        for request in all_requests() {
            let variant = request.variant();
            let call = builder.build(&request);
            let profile = CallProfile::for_variant(variant);

            assert_eq!(call.route(), profile.route);
            assert_eq!(call.max_output_tokens(), profile.max_output_tokens);
            assert!(!call.system_instruction().is_empty());
            for field in ResultSchema::for_variant(variant).fields {
                assert!(
                    call.user_prompt().contains(field.name),
                    "{variant} prompt does not mention {}",
                    field.name
                );
            }
        }
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let builder = PromptBuilder::default();
        let call = builder.build(&ClinicalRequest::SymptomCheck(SymptomCheck::new(
            "fever and cough",
            "klingon",
        )));

        assert!(call.user_prompt().contains("Respond in English."));
        assert!(call.user_prompt().contains("fever and cough"));
    }

    #[test]
    fn known_language_uses_its_own_instruction() {
        let call = PromptBuilder::default().build(&ClinicalRequest::SymptomCheck(
            SymptomCheck::new("बुखार", " Hindi "),
        ));
        assert!(call.user_prompt().contains(Language::Hindi.instruction()));
        assert!(!call.user_prompt().contains("Respond in English."));
    }

    #[test]
    fn image_analysis_uses_the_heavy_model_and_carries_the_image() {
        let builder = PromptBuilder::default();
        let requests = all_requests();
        let call = builder.build(&requests[4]);

        assert_eq!(call.model_class(), ModelClass::Heavy);
        assert_eq!(call.model(), "llama3.1-70b");
        assert!(call.image().is_some());
        assert!(call.user_prompt().contains("Image Type: ct"));

        let tb_call = builder.build(&requests[5]);
        assert_eq!(tb_call.model_class(), ModelClass::Light);
        assert_eq!(tb_call.temperature(), 0.1);
    }

    #[test]
    fn missing_profile_fields_render_as_unspecified() {
        let requests = all_requests();
        let call = PromptBuilder::default().build(&requests[2]);
        assert!(call.user_prompt().contains("Patient Age: unspecified"));
        assert!(call.user_prompt().contains("Economic Status: unspecified"));
    }

    #[test]
    fn maternal_prompt_lists_every_vital() {
        let requests = all_requests();
        let call = PromptBuilder::default().build(&requests[1]);
        let prompt = call.user_prompt();
        assert!(prompt.contains("Blood Pressure: 190/120 mmHg"));
        assert!(prompt.contains("Hemoglobin: 8 g/dL"));
        assert!(prompt.contains("Gestational Age: 32 weeks"));
        assert!(prompt.contains("overall_risk, risk_score, requires_hospital_admission"));
    }
}
