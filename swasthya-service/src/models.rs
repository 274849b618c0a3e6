use clinical_flow::request::{
    AudioFeatures, AudioFeaturesInput, OutbreakData, OutbreakDataInput, PatientProfile,
    SymptomCheck, TreatmentRequest, VitalSigns, VitalSignsInput,
};
use clinical_flow::{ClinicalRequest, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomCheckerRequest {
    pub symptoms: Option<String>,
    pub language: Option<String>,
    pub patient_age: Option<Value>,
    pub location: Option<String>,
}

impl SymptomCheckerRequest {
    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("english")
    }

    pub fn to_request(&self) -> Result<ClinicalRequest, ValidationError> {
        let symptoms = self
            .symptoms
            .clone()
            .ok_or(ValidationError::MissingField("symptoms"))?;
        Ok(ClinicalRequest::SymptomCheck(SymptomCheck::new(
            symptoms,
            self.language(),
        )))
    }

    /// Input as echoed back to the caller, with the language default applied.
    pub fn echo(&self) -> Value {
        serde_json::json!({
            "symptoms": self.symptoms,
            "language": self.language(),
            "patientAge": self.patient_age,
            "location": self.location,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaternalRiskRequest {
    pub vital_signs: Option<VitalSignsInput>,
    pub patient_info: Option<Value>,
}

impl MaternalRiskRequest {
    pub fn to_request(&self) -> Result<ClinicalRequest, ValidationError> {
        let input = self
            .vital_signs
            .clone()
            .ok_or(ValidationError::MissingField("vitalSigns"))?;
        Ok(ClinicalRequest::MaternalRisk(VitalSigns::try_from(input)?))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfileInput {
    pub age: Option<f64>,
    pub location: Option<String>,
    pub economic_status: Option<String>,
}

impl From<PatientProfileInput> for PatientProfile {
    fn from(input: PatientProfileInput) -> Self {
        PatientProfile {
            age: input
                .age
                .filter(|a| a.is_finite() && *a >= 0.0 && *a <= 150.0)
                .map(|a| a.round() as u32),
            location: input.location,
            economic_status: input.economic_status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentPlanRequest {
    pub diagnosis: Option<String>,
    pub patient_profile: Option<PatientProfileInput>,
}

impl TreatmentPlanRequest {
    pub fn into_request(self) -> Result<ClinicalRequest, ValidationError> {
        let diagnosis = self
            .diagnosis
            .ok_or(ValidationError::MissingField("diagnosis"))?;
        Ok(ClinicalRequest::TreatmentPlan(TreatmentRequest {
            diagnosis,
            profile: self.patient_profile.unwrap_or_default().into(),
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutbreakRequest {
    pub disease_data: Option<OutbreakDataInput>,
}

impl OutbreakRequest {
    pub fn into_request(self) -> Result<ClinicalRequest, ValidationError> {
        let input = self
            .disease_data
            .ok_or(ValidationError::MissingField("diseaseData"))?;
        Ok(ClinicalRequest::OutbreakPrediction(OutbreakData::try_from(
            input,
        )?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoughRequest {
    pub audio_features: Option<AudioFeaturesInput>,
}

impl CoughRequest {
    pub fn into_request(self) -> Result<ClinicalRequest, ValidationError> {
        let input = self
            .audio_features
            .ok_or(ValidationError::MissingField("audioFeatures"))?;
        Ok(ClinicalRequest::CoughAnalysis(AudioFeatures::try_from(
            input,
        )?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_time_range() -> String {
    "7d".to_string()
}

fn default_region() -> String {
    "all".to_string()
}

/// One file's entry in a batch screening response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFileResult {
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filled_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    pub total_processed: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub results: Vec<BatchFileResult>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiseaseCount {
    pub disease: &'static str,
    pub count: u32,
    pub trend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionCases {
    pub region: &'static str,
    pub cases: u32,
    pub risk: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyDiagnoses {
    pub date: &'static str,
    pub diagnoses: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutbreakAlert {
    pub disease: &'static str,
    pub region: &'static str,
    pub probability: f64,
    pub timeline: &'static str,
    pub severity: &'static str,
}

/// Surveillance snapshot served to the dashboard. Figures other than
/// `active_users` are static sample data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAnalytics {
    pub total_diagnoses: u32,
    pub today_diagnoses: u32,
    pub active_users: usize,
    pub tb_detections: u32,
    pub maternal_risk_alerts: u32,
    pub critical_cases: u32,
    pub disease_breakdown: Vec<DiseaseCount>,
    pub region_wise_data: Vec<RegionCases>,
    pub weekly_trend: Vec<DailyDiagnoses>,
    pub outbreak_alerts: Vec<OutbreakAlert>,
}

impl DashboardAnalytics {
    pub fn sample(active_users: usize) -> Self {
        let disease = |disease, count, trend| DiseaseCount {
            disease,
            count,
            trend,
        };
        let region = |region, cases, risk| RegionCases { region, cases, risk };
        let day = |date, diagnoses| DailyDiagnoses { date, diagnoses };

        Self {
            total_diagnoses: 12847,
            today_diagnoses: 342,
            active_users,
            tb_detections: 1247,
            maternal_risk_alerts: 89,
            critical_cases: 23,
            disease_breakdown: vec![
                disease("Tuberculosis", 1247, "+12%"),
                disease("Pneumonia", 892, "+5%"),
                disease("Malaria", 456, "-3%"),
                disease("Dengue", 234, "+18%"),
                disease("COVID-19", 123, "-8%"),
            ],
            region_wise_data: vec![
                region("Maharashtra", 3421, "medium"),
                region("Bihar", 2890, "high"),
                region("Uttar Pradesh", 2456, "medium"),
                region("West Bengal", 1823, "low"),
            ],
            weekly_trend: vec![
                day("2024-09-23", 1845),
                day("2024-09-24", 1923),
                day("2024-09-25", 2134),
                day("2024-09-26", 2056),
                day("2024-09-27", 2198),
                day("2024-09-28", 2301),
                day("2024-09-29", 2390),
            ],
            outbreak_alerts: vec![
                OutbreakAlert {
                    disease: "Dengue",
                    region: "Kerala",
                    probability: 0.78,
                    timeline: "2-3 weeks",
                    severity: "high",
                },
                OutbreakAlert {
                    disease: "Malaria",
                    region: "Odisha",
                    probability: 0.65,
                    timeline: "3-4 weeks",
                    severity: "medium",
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symptom_request_defaults_language_and_echoes_input() {
        let body: SymptomCheckerRequest = serde_json::from_value(json!({
            "symptoms": "fever",
            "patientAge": 34
        }))
        .unwrap();

        let ClinicalRequest::SymptomCheck(check) = body.to_request().unwrap() else {
            panic!("expected a symptom check");
        };
        assert_eq!(check.language, "english");
        assert_eq!(body.echo()["patientAge"], 34);
        assert_eq!(body.echo()["language"], "english");
    }

    #[test]
    fn missing_top_level_fields_are_named() {
        let body: OutbreakRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(
            body.into_request().unwrap_err(),
            ValidationError::MissingField("diseaseData")
        );

        let body: CoughRequest = serde_json::from_value(json!({
            "audioFeatures": {"duration": 900, "frequency": 300, "intensity": 0.4}
        }))
        .unwrap();
        assert_eq!(
            body.into_request().unwrap_err(),
            ValidationError::MissingField("pattern")
        );
    }

    #[test]
    fn treatment_profile_is_optional() {
        let body: TreatmentPlanRequest =
            serde_json::from_value(json!({"diagnosis": "Malaria"})).unwrap();
        let ClinicalRequest::TreatmentPlan(plan) = body.into_request().unwrap() else {
            panic!("expected a treatment plan");
        };
        assert_eq!(plan.profile, PatientProfile::default());
    }

    #[test]
    fn analytics_report_live_connections() {
        let value = serde_json::to_value(DashboardAnalytics::sample(7)).unwrap();
        assert_eq!(value["activeUsers"], 7);
        assert_eq!(value["diseaseBreakdown"][0]["disease"], "Tuberculosis");
    }
}
