//! Typed clinical requests and the loosely-typed wire inputs they are parsed from.
//!
//! Wire inputs mirror the JSON bodies sent by clients (camelCase, every field
//! optional). Converting an input into its typed counterpart is the only place
//! where missing or malformed fields are detected; a typed request that passes
//! [`ClinicalRequest::validate`] can always be turned into a prompt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// The kind of clinical operation, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    SymptomCheck,
    MaternalRisk,
    TreatmentPlan,
    OutbreakPrediction,
    ImageAnalysis,
    TbScreen,
    CoughAnalysis,
}

impl Variant {
    pub const ALL: [Variant; 7] = [
        Variant::SymptomCheck,
        Variant::MaternalRisk,
        Variant::TreatmentPlan,
        Variant::OutbreakPrediction,
        Variant::ImageAnalysis,
        Variant::TbScreen,
        Variant::CoughAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::SymptomCheck => "symptom_check",
            Variant::MaternalRisk => "maternal_risk",
            Variant::TreatmentPlan => "treatment_plan",
            Variant::OutbreakPrediction => "outbreak_prediction",
            Variant::ImageAnalysis => "image_analysis",
            Variant::TbScreen => "tb_screen",
            Variant::CoughAnalysis => "cough_analysis",
        }
    }

    /// Message type used when a result of this variant is pushed to a connection.
    pub fn result_type(&self) -> &'static str {
        match self {
            Variant::SymptomCheck => "symptom_analysis_result",
            Variant::MaternalRisk => "maternal_risk_result",
            Variant::TreatmentPlan => "treatment_plan_result",
            Variant::OutbreakPrediction => "outbreak_prediction_result",
            Variant::ImageAnalysis => "image_analysis_result",
            Variant::TbScreen => "tb_screen_result",
            Variant::CoughAnalysis => "cough_analysis_result",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClinicalRequest {
    SymptomCheck(SymptomCheck),
    MaternalRisk(VitalSigns),
    TreatmentPlan(TreatmentRequest),
    OutbreakPrediction(OutbreakData),
    ImageAnalysis(ImageStudy),
    TbScreen(ImagePayload),
    CoughAnalysis(AudioFeatures),
}

impl ClinicalRequest {
    pub fn variant(&self) -> Variant {
        match self {
            ClinicalRequest::SymptomCheck(_) => Variant::SymptomCheck,
            ClinicalRequest::MaternalRisk(_) => Variant::MaternalRisk,
            ClinicalRequest::TreatmentPlan(_) => Variant::TreatmentPlan,
            ClinicalRequest::OutbreakPrediction(_) => Variant::OutbreakPrediction,
            ClinicalRequest::ImageAnalysis(_) => Variant::ImageAnalysis,
            ClinicalRequest::TbScreen(_) => Variant::TbScreen,
            ClinicalRequest::CoughAnalysis(_) => Variant::CoughAnalysis,
        }
    }

    /// Image carried by the request, if the variant needs one.
    pub fn image(&self) -> Option<&ImagePayload> {
        match self {
            ClinicalRequest::ImageAnalysis(study) => Some(&study.image),
            ClinicalRequest::TbScreen(image) => Some(image),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ClinicalRequest::SymptomCheck(check) => {
                require_text("symptoms", &check.symptoms)?;
                Ok(())
            }
            ClinicalRequest::MaternalRisk(vitals) => vitals.validate(),
            ClinicalRequest::TreatmentPlan(plan) => {
                require_text("diagnosis", &plan.diagnosis)?;
                Ok(())
            }
            ClinicalRequest::OutbreakPrediction(data) => data.validate(),
            ClinicalRequest::ImageAnalysis(study) => study.image.validate(),
            ClinicalRequest::TbScreen(image) => image.validate(),
            ClinicalRequest::CoughAnalysis(features) => features.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomCheck {
    pub symptoms: String,
    /// Raw language code as sent by the client; resolved when the prompt is built.
    pub language: String,
}

impl SymptomCheck {
    pub fn new(symptoms: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            symptoms: symptoms.into(),
            language: language.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub blood_pressure: BloodPressure,
    pub weight_kg: f64,
    pub hemoglobin_g_dl: f64,
    pub glucose_mg_dl: f64,
    pub gestational_age_weeks: u32,
    pub previous_pregnancies: u32,
}

impl VitalSigns {
    fn validate(&self) -> Result<(), ValidationError> {
        let bp = self.blood_pressure;
        if bp.systolic == 0 || bp.diastolic == 0 {
            return Err(ValidationError::invalid(
                "bloodPressure",
                "systolic and diastolic must be positive",
            ));
        }
        if bp.diastolic >= bp.systolic {
            return Err(ValidationError::invalid(
                "bloodPressure",
                format!("diastolic {} is not below systolic {}", bp.diastolic, bp.systolic),
            ));
        }
        require_positive("weight", self.weight_kg)?;
        require_positive("hemoglobin", self.hemoglobin_g_dl)?;
        require_positive("glucose", self.glucose_mg_dl)?;
        if self.gestational_age_weeks > 45 {
            return Err(ValidationError::invalid(
                "gestationalAge",
                format!("{} weeks is outside 0-45", self.gestational_age_weeks),
            ));
        }
        Ok(())
    }
}

/// Patient profile used by the treatment planner. Absent fields are rendered
/// as "unspecified" in the prompt rather than guessed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub age: Option<u32>,
    pub location: Option<String>,
    pub economic_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentRequest {
    pub diagnosis: String,
    pub profile: PatientProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseCount {
    pub disease: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutbreakData {
    pub region: String,
    pub recent_cases: Vec<CaseCount>,
    pub symptoms: Vec<String>,
    pub season: String,
    pub temperature_c: f64,
}

impl OutbreakData {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("region", &self.region)?;
        require_text("season", &self.season)?;
        require_finite("temperature", self.temperature_c)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageModality {
    #[default]
    Xray,
    Ct,
    Mri,
    Ultrasound,
}

impl ImageModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageModality::Xray => "xray",
            ImageModality::Ct => "ct",
            ImageModality::Mri => "mri",
            ImageModality::Ultrasound => "ultrasound",
        }
    }
}

impl FromStr for ImageModality {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xray" | "x-ray" => Ok(ImageModality::Xray),
            "ct" => Ok(ImageModality::Ct),
            "mri" => Ok(ImageModality::Mri),
            "ultrasound" => Ok(ImageModality::Ultrasound),
            other => Err(ValidationError::invalid(
                "imageType",
                format!("unsupported modality '{other}'"),
            )),
        }
    }
}

/// Preprocessed image bytes ready to be attached to a vision call.
#[derive(Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::MissingField("image"));
        }
        Ok(())
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageStudy {
    pub image: ImagePayload,
    pub modality: ImageModality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub duration_ms: f64,
    pub frequency_hz: f64,
    pub intensity: f64,
    pub pattern: String,
}

impl AudioFeatures {
    fn validate(&self) -> Result<(), ValidationError> {
        require_positive("duration", self.duration_ms)?;
        require_positive("frequency", self.frequency_hz)?;
        require_finite("intensity", self.intensity)?;
        require_text("pattern", &self.pattern)?;
        Ok(())
    }
}

// Wire inputs

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BloodPressureInput {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSignsInput {
    pub blood_pressure: Option<BloodPressureInput>,
    pub weight: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub glucose: Option<f64>,
    pub gestational_age: Option<f64>,
    pub previous_pregnancies: Option<f64>,
}

impl TryFrom<VitalSignsInput> for VitalSigns {
    type Error = ValidationError;

    fn try_from(input: VitalSignsInput) -> Result<Self, Self::Error> {
        let bp = input
            .blood_pressure
            .ok_or(ValidationError::MissingField("bloodPressure"))?;
        let vitals = VitalSigns {
            blood_pressure: BloodPressure {
                systolic: whole("bloodPressure.systolic", bp.systolic)?,
                diastolic: whole("bloodPressure.diastolic", bp.diastolic)?,
            },
            weight_kg: present("weight", input.weight)?,
            hemoglobin_g_dl: present("hemoglobin", input.hemoglobin)?,
            glucose_mg_dl: present("glucose", input.glucose)?,
            gestational_age_weeks: whole("gestationalAge", input.gestational_age)?,
            previous_pregnancies: whole("previousPregnancies", input.previous_pregnancies)?,
        };
        vitals.validate()?;
        Ok(vitals)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseCountInput {
    pub disease: Option<String>,
    pub count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutbreakDataInput {
    pub region: Option<String>,
    pub recent_cases: Option<Vec<CaseCountInput>>,
    pub symptoms: Option<Vec<String>>,
    pub season: Option<String>,
    pub temperature: Option<f64>,
}

impl TryFrom<OutbreakDataInput> for OutbreakData {
    type Error = ValidationError;

    fn try_from(input: OutbreakDataInput) -> Result<Self, Self::Error> {
        let recent_cases = input
            .recent_cases
            .ok_or(ValidationError::MissingField("recentCases"))?
            .into_iter()
            .map(|case| -> Result<CaseCount, ValidationError> {
                Ok(CaseCount {
                    disease: case
                        .disease
                        .filter(|d| !d.trim().is_empty())
                        .ok_or(ValidationError::MissingField("recentCases.disease"))?,
                    count: u64::from(whole("recentCases.count", case.count)?),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let data = OutbreakData {
            region: input.region.ok_or(ValidationError::MissingField("region"))?,
            recent_cases,
            symptoms: input.symptoms.ok_or(ValidationError::MissingField("symptoms"))?,
            season: input.season.ok_or(ValidationError::MissingField("season"))?,
            temperature_c: present("temperature", input.temperature)?,
        };
        data.validate()?;
        Ok(data)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioFeaturesInput {
    pub duration: Option<f64>,
    pub frequency: Option<f64>,
    pub intensity: Option<f64>,
    pub pattern: Option<String>,
}

impl TryFrom<AudioFeaturesInput> for AudioFeatures {
    type Error = ValidationError;

    fn try_from(input: AudioFeaturesInput) -> Result<Self, Self::Error> {
        let features = AudioFeatures {
            duration_ms: present("duration", input.duration)?,
            frequency_hz: present("frequency", input.frequency)?,
            intensity: present("intensity", input.intensity)?,
            pattern: input.pattern.ok_or(ValidationError::MissingField("pattern"))?,
        };
        features.validate()?;
        Ok(features)
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::invalid(field, "must be a finite number"));
    }
    Ok(())
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    require_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::invalid(field, format!("{value} must be positive")));
    }
    Ok(())
}

fn present(field: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    require_finite(field, value)?;
    Ok(value)
}

/// Accepts integral JSON numbers only (`32` or `32.0`, never `32.5` or `-1`).
fn whole(field: &'static str, value: Option<f64>) -> Result<u32, ValidationError> {
    let value = present(field, value)?;
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(ValidationError::invalid(
            field,
            format!("{value} is not a non-negative whole number"),
        ));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vitals_json() -> serde_json::Value {
        json!({
            "bloodPressure": { "systolic": 190, "diastolic": 120 },
            "weight": 65,
            "hemoglobin": 8.0,
            "glucose": 250,
            "gestationalAge": 32,
            "previousPregnancies": 1
        })
    }

    #[test]
    fn vital_signs_parse_from_wire_input() {
        let input: VitalSignsInput = serde_json::from_value(vitals_json()).unwrap();
        let vitals = VitalSigns::try_from(input).unwrap();

        assert_eq!(vitals.blood_pressure.systolic, 190);
        assert_eq!(vitals.blood_pressure.diastolic, 120);
        assert_eq!(vitals.gestational_age_weeks, 32);
        assert_eq!(vitals.previous_pregnancies, 1);
        assert_eq!(vitals.hemoglobin_g_dl, 8.0);
    }

    #[test]
    fn missing_vital_is_reported_by_name() {
        let mut body = vitals_json();
        body["glucose"] = serde_json::Value::Null;
        let input: VitalSignsInput = serde_json::from_value(body).unwrap();

        assert_eq!(
            VitalSigns::try_from(input).unwrap_err(),
            ValidationError::MissingField("glucose")
        );
    }

    #[test]
    fn fractional_gestational_age_is_rejected() {
        let mut body = vitals_json();
        body["gestationalAge"] = json!(32.5);
        let input: VitalSignsInput = serde_json::from_value(body).unwrap();

        assert!(matches!(
            VitalSigns::try_from(input),
            Err(ValidationError::InvalidField { field: "gestationalAge", .. })
        ));
    }

    #[test]
    fn blank_symptoms_fail_validation() {
        let request = ClinicalRequest::SymptomCheck(SymptomCheck::new("   ", "english"));
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::MissingField("symptoms")
        );
    }

    #[test]
    fn modality_parsing_is_case_insensitive() {
        assert_eq!("X-Ray".parse::<ImageModality>().unwrap(), ImageModality::Xray);
        assert_eq!(" MRI ".parse::<ImageModality>().unwrap(), ImageModality::Mri);
        assert!("pet".parse::<ImageModality>().is_err());
    }

    #[test]
    fn outbreak_input_requires_case_list() {
        let input: OutbreakDataInput = serde_json::from_value(json!({
            "region": "Kerala",
            "symptoms": ["fever"],
            "season": "monsoon",
            "temperature": 31.5
        }))
        .unwrap();

        assert_eq!(
            OutbreakData::try_from(input).unwrap_err(),
            ValidationError::MissingField("recentCases")
        );
    }

    #[test]
    fn empty_image_is_rejected() {
        let request = ClinicalRequest::TbScreen(ImagePayload::new("image/jpeg", Vec::new()));
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::MissingField("image")
        );
    }
}
