//! Expected JSON shape of every variant's result.
//!
//! One [`ResultSchema`] per [`Variant`] is shared by the prompt builder, which
//! renders it as the response template the model must follow, and by the
//! extractor, which uses it to validate and normalise untrusted model output
//! before the typed deserialisation step.

use serde_json::{Map, Number, Value};
use std::fmt::{self, Write};

use crate::request::Variant;

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Boolean,
    Number { min: f64, max: f64 },
    Integer { min: i64, max: i64 },
    /// Lower-case string drawn from a closed set.
    OneOf(&'static [&'static str]),
    TextList,
    Object(&'static [FieldSpec]),
    ObjectList(&'static [FieldSpec]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Placeholder shown to the model for free-text fields.
    pub hint: &'static str,
}

const fn required(name: &'static str, kind: FieldKind, hint: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        hint,
    }
}

const fn optional(name: &'static str, kind: FieldKind, hint: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        hint,
    }
}

const PROBABILITY: FieldKind = FieldKind::Number { min: 0.0, max: 1.0 };
const SEVERITY: FieldKind = FieldKind::OneOf(&["mild", "moderate", "severe", "critical"]);

const DIAGNOSIS_CANDIDATE: &[FieldSpec] = &[
    required("disease", FieldKind::Text, "Disease name"),
    optional("probability", PROBABILITY, ""),
    optional("reasoning", FieldKind::Text, "Why this diagnosis"),
    optional("common_in_india", FieldKind::Boolean, ""),
];

const SYMPTOM_FIELDS: &[FieldSpec] = &[
    optional("differential_diagnosis", FieldKind::ObjectList(DIAGNOSIS_CANDIDATE), ""),
    optional("follow_up_questions", FieldKind::TextList, "Question to narrow diagnosis"),
    optional("immediate_advice", FieldKind::TextList, "What to do right now"),
    required("severity_assessment", SEVERITY, ""),
    required("requires_hospital", FieldKind::Boolean, ""),
    required("requires_emergency", FieldKind::Boolean, ""),
    optional("home_remedies", FieldKind::TextList, "Safe home remedy"),
    optional("recommended_tests", FieldKind::TextList, "Blood test"),
    optional("estimated_cost", FieldKind::Text, "₹500-2000"),
    optional(
        "nearest_facility",
        FieldKind::Text,
        "Primary Health Center / District Hospital / Emergency",
    ),
];

const SPECIFIC_RISK: &[FieldSpec] = &[
    required(
        "condition",
        FieldKind::Text,
        "Preeclampsia/Gestational Diabetes/Anemia/etc",
    ),
    optional("probability", PROBABILITY, ""),
    optional("warning_signs", FieldKind::TextList, "Warning sign"),
    optional("timeline", FieldKind::Text, "Expected in 2-3 weeks"),
];

const MATERNAL_FIELDS: &[FieldSpec] = &[
    required(
        "overall_risk",
        FieldKind::OneOf(&["low", "medium", "high", "critical"]),
        "",
    ),
    required("risk_score", FieldKind::Integer { min: 1, max: 10 }, ""),
    optional("specific_risks", FieldKind::ObjectList(SPECIFIC_RISK), ""),
    optional("immediate_actions", FieldKind::TextList, "Action"),
    optional(
        "dietary_recommendations",
        FieldKind::TextList,
        "Increase iron-rich foods",
    ),
    optional(
        "monitoring_frequency",
        FieldKind::OneOf(&["daily", "weekly", "biweekly"]),
        "",
    ),
    required("requires_hospital_admission", FieldKind::Boolean, ""),
    optional("follow_up_tests", FieldKind::TextList, "Test"),
    optional(
        "estimated_delivery_complications",
        FieldKind::OneOf(&["low", "medium", "high"]),
        "",
    ),
];

const MEDICATION: &[FieldSpec] = &[
    required("name", FieldKind::Text, "Medicine name (Generic + Brand)"),
    optional("dosage", FieldKind::Text, "500mg twice daily"),
    optional("duration", FieldKind::Text, "7 days"),
    optional("cost", FieldKind::Text, "₹50-100"),
    optional("available_at", FieldKind::Text, "PHC/Medical store"),
];

const DIET_PLAN: &[FieldSpec] = &[
    optional("foods_to_eat", FieldKind::TextList, "Food"),
    optional("foods_to_avoid", FieldKind::TextList, "Food"),
    optional("local_alternatives", FieldKind::TextList, "Available in village"),
];

const TREATMENT_FIELDS: &[FieldSpec] = &[
    required("medications", FieldKind::ObjectList(MEDICATION), ""),
    optional("lifestyle_changes", FieldKind::TextList, "Change"),
    optional("diet_plan", FieldKind::Object(DIET_PLAN), ""),
    optional(
        "follow_up_schedule",
        FieldKind::Text,
        "After 3 days, 1 week, 2 weeks",
    ),
    optional("warning_signs", FieldKind::TextList, "When to rush to hospital"),
    optional("estimated_recovery_time", FieldKind::Text, "7-10 days"),
    optional("total_estimated_cost", FieldKind::Text, "₹500-1500"),
    optional("government_schemes", FieldKind::TextList, "Ayushman Bharat"),
];

const REQUIRED_RESOURCES: &[FieldSpec] = &[
    optional("medicines", FieldKind::TextList, "Medicine"),
    optional("medical_staff", FieldKind::Text, "10 doctors, 20 nurses"),
    optional("equipment", FieldKind::TextList, "Equipment"),
];

const OUTBREAK_FIELDS: &[FieldSpec] = &[
    required("outbreak_probability", PROBABILITY, ""),
    required("predicted_disease", FieldKind::Text, "Disease name"),
    optional("expected_timeline", FieldKind::Text, "In 2-3 weeks"),
    optional("affected_population", FieldKind::Text, "Estimated number"),
    optional("risk_factors", FieldKind::TextList, "Factor"),
    optional("prevention_measures", FieldKind::TextList, "Measure"),
    optional(
        "required_resources",
        FieldKind::Object(REQUIRED_RESOURCES),
        "",
    ),
    optional("priority_actions", FieldKind::TextList, "Action"),
];

const DETECTED_DISEASE: &[FieldSpec] = &[
    required("name", FieldKind::Text, "Disease name"),
    optional("confidence", PROBABILITY, ""),
    optional("severity", SEVERITY, ""),
    optional("location", FieldKind::Text, "Specific area in image"),
    optional("description", FieldKind::Text, "Detailed medical explanation"),
];

const FINDING_FLAG: &[FieldSpec] = &[
    required("present", FieldKind::Boolean, ""),
    optional("confidence", PROBABILITY, ""),
];

const FINDINGS: &[FieldSpec] = &[
    optional("tuberculosis", FieldKind::Object(FINDING_FLAG), ""),
    optional("pneumonia", FieldKind::Object(FINDING_FLAG), ""),
    optional("fracture", FieldKind::Object(FINDING_FLAG), ""),
    optional("tumor", FieldKind::Object(FINDING_FLAG), ""),
    optional("covid19", FieldKind::Object(FINDING_FLAG), ""),
];

const IMAGE_FIELDS: &[FieldSpec] = &[
    required("diseases_detected", FieldKind::ObjectList(DETECTED_DISEASE), ""),
    required(
        "overall_assessment",
        FieldKind::Text,
        "General health assessment",
    ),
    optional("recommendations", FieldKind::TextList, "Specific medical recommendation"),
    required(
        "urgency",
        FieldKind::OneOf(&["normal", "urgent", "emergency"]),
        "",
    ),
    optional("next_steps", FieldKind::Text, "What patient should do next"),
    optional("findings", FieldKind::Object(FINDINGS), ""),
];

const TB_FIELDS: &[FieldSpec] = &[
    required("tb_detected", FieldKind::Boolean, ""),
    required("confidence", PROBABILITY, ""),
    optional(
        "tb_type",
        FieldKind::OneOf(&["active", "latent", "none"]),
        "",
    ),
    optional("affected_areas", FieldKind::TextList, "upper right lobe"),
    optional("severity_score", FieldKind::Integer { min: 0, max: 10 }, ""),
    optional(
        "treatment_urgency",
        FieldKind::OneOf(&["immediate", "within_week", "monitoring"]),
        "",
    ),
    optional("additional_tests_needed", FieldKind::TextList, "Sputum test"),
];

const DISEASE_PROBABILITY: &[FieldSpec] = &[
    required("name", FieldKind::Text, "Disease"),
    optional("probability", PROBABILITY, ""),
];

const COUGH_FIELDS: &[FieldSpec] = &[
    required("diseases", FieldKind::ObjectList(DISEASE_PROBABILITY), ""),
    required(
        "cough_type",
        FieldKind::OneOf(&["dry", "wet", "barking", "whooping", "unknown"]),
        "",
    ),
    optional(
        "severity",
        FieldKind::OneOf(&["mild", "moderate", "severe"]),
        "",
    ),
    optional("recommendations", FieldKind::TextList, "advice"),
    optional("requires_xray", FieldKind::Boolean, ""),
];

#[derive(Debug)]
pub struct ResultSchema {
    pub variant: Variant,
    pub fields: &'static [FieldSpec],
}

static SCHEMAS: [ResultSchema; 7] = [
    ResultSchema {
        variant: Variant::SymptomCheck,
        fields: SYMPTOM_FIELDS,
    },
    ResultSchema {
        variant: Variant::MaternalRisk,
        fields: MATERNAL_FIELDS,
    },
    ResultSchema {
        variant: Variant::TreatmentPlan,
        fields: TREATMENT_FIELDS,
    },
    ResultSchema {
        variant: Variant::OutbreakPrediction,
        fields: OUTBREAK_FIELDS,
    },
    ResultSchema {
        variant: Variant::ImageAnalysis,
        fields: IMAGE_FIELDS,
    },
    ResultSchema {
        variant: Variant::TbScreen,
        fields: TB_FIELDS,
    },
    ResultSchema {
        variant: Variant::CoughAnalysis,
        fields: COUGH_FIELDS,
    },
];

/// Where and why a model answer failed to match its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl ResultSchema {
    pub fn for_variant(variant: Variant) -> &'static ResultSchema {
        match variant {
            Variant::SymptomCheck => &SCHEMAS[0],
            Variant::MaternalRisk => &SCHEMAS[1],
            Variant::TreatmentPlan => &SCHEMAS[2],
            Variant::OutbreakPrediction => &SCHEMAS[3],
            Variant::ImageAnalysis => &SCHEMAS[4],
            Variant::TbScreen => &SCHEMAS[5],
            Variant::CoughAnalysis => &SCHEMAS[6],
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }

    /// Renders the response template embedded in prompts.
    pub fn render_template(&self) -> String {
        let mut out = String::new();
        render_object(&mut out, self.fields, 0);
        out
    }

    /// Validates `value` against the schema and normalises it.
    ///
    /// Missing optional fields get a neutral value (empty text or list,
    /// `false`, the lowest value of a range or the first option of an enum)
    /// and their paths are listed in [`Conformed::filled`], so a partial
    /// answer never picks up clinical advice the model did not give. Enum
    /// strings are trimmed and lower-cased, integral floats are accepted for
    /// integer fields, and scalars are accepted where a text field or a
    /// one-element text list is expected.
    pub fn conform(&self, value: Value) -> Result<Conformed, SchemaViolation> {
        let mut filled = Vec::new();
        let value = conform_object(self.fields, value, "", &mut filled)?;
        Ok(Conformed { value, filled })
    }
}

/// A schema-conformed answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Conformed {
    pub value: Value,
    /// Paths of optional fields the model left out, in schema order.
    pub filled: Vec<String>,
}

fn render_object(out: &mut String, fields: &[FieldSpec], depth: usize) {
    let pad = "  ".repeat(depth + 1);
    out.push_str("{\n");
    for (i, field) in fields.iter().enumerate() {
        let _ = write!(out, "{pad}\"{}\": ", field.name);
        render_kind(out, field, depth + 1);
        if i + 1 < fields.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str(&"  ".repeat(depth));
    out.push('}');
}

fn render_kind(out: &mut String, field: &FieldSpec, depth: usize) {
    match field.kind {
        FieldKind::Text => {
            let _ = write!(out, "\"{}\"", field.hint);
        }
        FieldKind::Boolean => out.push_str("true/false"),
        FieldKind::Number { min, max } => {
            let _ = write!(out, "{min:?}-{max:?}");
        }
        FieldKind::Integer { min, max } => {
            let _ = write!(out, "{min}-{max}");
        }
        FieldKind::OneOf(options) => {
            let _ = write!(out, "\"{}\"", options.join("/"));
        }
        FieldKind::TextList => {
            let _ = write!(out, "[\"{}\", \"...\"]", field.hint);
        }
        FieldKind::Object(fields) => render_object(out, fields, depth),
        FieldKind::ObjectList(fields) => {
            out.push_str("[\n");
            out.push_str(&"  ".repeat(depth + 1));
            render_object(out, fields, depth + 1);
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
            out.push(']');
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn conform_object(
    fields: &[FieldSpec],
    value: Value,
    path: &str,
    filled: &mut Vec<String>,
) -> Result<Value, SchemaViolation> {
    let Value::Object(mut source) = value else {
        return Err(SchemaViolation::new(path, "expected a JSON object"));
    };

    let mut conformed = Map::with_capacity(fields.len());
    for field in fields {
        let field_path = child_path(path, field.name);
        let value = match source.remove(field.name) {
            Some(Value::Null) | None if field.required => {
                return Err(SchemaViolation::new(&field_path, "required field is missing"));
            }
            Some(Value::Null) | None => {
                filled.push(field_path);
                default_for(&field.kind)
            }
            Some(present) => conform_field(&field.kind, present, &field_path, filled)?,
        };
        conformed.insert(field.name.to_string(), value);
    }
    Ok(Value::Object(conformed))
}

fn conform_field(
    kind: &FieldKind,
    value: Value,
    path: &str,
    filled: &mut Vec<String>,
) -> Result<Value, SchemaViolation> {
    match (kind, value) {
        (FieldKind::Text, Value::String(s)) => Ok(Value::String(s)),
        (FieldKind::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldKind::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),

        (FieldKind::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (FieldKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(Value::Bool(true)),
            "false" | "no" => Ok(Value::Bool(false)),
            other => Err(SchemaViolation::new(path, format!("'{other}' is not a boolean"))),
        },

        (FieldKind::Number { min, max }, value) => {
            let n = numeric(&value)
                .ok_or_else(|| SchemaViolation::new(path, "expected a number"))?;
            if n < *min || n > *max {
                return Err(SchemaViolation::new(
                    path,
                    format!("{n} is outside {min}-{max}"),
                ));
            }
            Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| SchemaViolation::new(path, "number is not finite"))
        }

        (FieldKind::Integer { min, max }, value) => {
            let n = numeric(&value)
                .ok_or_else(|| SchemaViolation::new(path, "expected an integer"))?;
            if n.fract() != 0.0 {
                return Err(SchemaViolation::new(path, format!("{n} is not a whole number")));
            }
            let n = n as i64;
            if n < *min || n > *max {
                return Err(SchemaViolation::new(
                    path,
                    format!("{n} is outside {min}-{max}"),
                ));
            }
            Ok(Value::from(n))
        }

        (FieldKind::OneOf(options), Value::String(s)) => {
            let normalised = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
            if options.contains(&normalised.as_str()) {
                Ok(Value::String(normalised))
            } else {
                Err(SchemaViolation::new(
                    path,
                    format!("'{s}' is not one of {}", options.join("/")),
                ))
            }
        }

        (FieldKind::TextList, Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(Value::String(s)),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                _ => Err(SchemaViolation::new(
                    &format!("{path}[{i}]"),
                    "expected a string",
                )),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldKind::TextList, Value::String(s)) => Ok(Value::Array(vec![Value::String(s)])),

        (FieldKind::Object(fields), value) => conform_object(fields, value, path, filled),

        (FieldKind::ObjectList(fields), Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| conform_object(fields, item, &format!("{path}[{i}]"), filled))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),

        (kind, other) => Err(SchemaViolation::new(
            path,
            format!("unexpected {} for {}", json_type(&other), kind_name(kind)),
        )),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn default_for(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Text => Value::String(String::new()),
        FieldKind::Boolean => Value::Bool(false),
        FieldKind::Number { min, .. } => Number::from_f64(*min).map_or(Value::Null, Value::Number),
        FieldKind::Integer { min, .. } => Value::from(*min),
        FieldKind::OneOf(options) => Value::String(options[0].to_string()),
        FieldKind::TextList | FieldKind::ObjectList(_) => Value::Array(Vec::new()),
        FieldKind::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|f| (f.name.to_string(), default_for(&f.kind)))
                .collect(),
        ),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "text field",
        FieldKind::Boolean => "boolean field",
        FieldKind::Number { .. } => "number field",
        FieldKind::Integer { .. } => "integer field",
        FieldKind::OneOf(_) => "enumerated field",
        FieldKind::TextList => "text list",
        FieldKind::Object(_) => "object",
        FieldKind::ObjectList(_) => "object list",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn maternal() -> &'static ResultSchema {
        ResultSchema::for_variant(Variant::MaternalRisk)
    }

    #[test]
    fn every_variant_has_its_own_schema() {
        for variant in Variant::ALL {
            assert_eq!(ResultSchema::for_variant(variant).variant, variant);
        }
    }

    #[test]
    fn template_lists_every_top_level_field() {
        for variant in Variant::ALL {
            let schema = ResultSchema::for_variant(variant);
            let template = schema.render_template();
            for field in schema.fields {
                assert!(
                    template.contains(&format!("\"{}\":", field.name)),
                    "{variant} template is missing {}",
                    field.name
                );
            }
        }
    }

    #[test]
    fn template_spells_out_value_domains() {
        let template = maternal().render_template();
        assert!(template.contains("\"low/medium/high/critical\""));
        assert!(template.contains("\"risk_score\": 1-10"));
        assert!(template.contains("\"requires_hospital_admission\": true/false"));
    }

    #[test]
    fn missing_optional_fields_are_neutral_and_listed() {
        let value = json!({
            "overall_risk": "High",
            "risk_score": 8.0,
            "requires_hospital_admission": "true",
            "specific_risks": [{ "condition": "Preeclampsia", "probability": 0.8 }]
        });

        let Conformed { value, filled } = maternal().conform(value).unwrap();

        assert_eq!(value["overall_risk"], "high");
        assert_eq!(value["risk_score"], 8);
        assert_eq!(value["requires_hospital_admission"], true);
        assert_eq!(value["immediate_actions"], json!([]));
        assert_eq!(value["specific_risks"][0]["timeline"], "");
        assert_eq!(
            filled,
            [
                "specific_risks[0].warning_signs",
                "specific_risks[0].timeline",
                "immediate_actions",
                "dietary_recommendations",
                "monitoring_frequency",
                "follow_up_tests",
                "estimated_delivery_complications",
            ]
        );
    }

    #[test]
    fn complete_answer_fills_nothing() {
        let schema = ResultSchema::for_variant(Variant::CoughAnalysis);
        let conformed = schema
            .conform(json!({
                "diseases": [{ "name": "Asthma", "probability": 0.4 }],
                "cough_type": "dry",
                "severity": "mild",
                "recommendations": ["Inhaler review"],
                "requires_xray": false
            }))
            .unwrap();
        assert!(conformed.filled.is_empty());
    }

    #[test]
    fn missing_required_field_is_a_violation() {
        let err = maternal()
            .conform(json!({ "risk_score": 4, "requires_hospital_admission": false }))
            .unwrap_err();
        assert_eq!(err.path, "overall_risk");
    }

    #[test]
    fn out_of_domain_values_are_violations() {
        let err = maternal()
            .conform(
                json!({
                    "overall_risk": "catastrophic",
                    "risk_score": 4,
                    "requires_hospital_admission": false
                }),
            )
            .unwrap_err();
        assert_eq!(err.path, "overall_risk");

        let err = maternal()
            .conform(
                json!({
                    "overall_risk": "low",
                    "risk_score": 11,
                    "requires_hospital_admission": false
                }),
            )
            .unwrap_err();
        assert_eq!(err.path, "risk_score");
    }

    #[test]
    fn nested_items_report_their_path() {
        let err = maternal()
            .conform(
                json!({
                    "overall_risk": "low",
                    "risk_score": 2,
                    "requires_hospital_admission": false,
                    "specific_risks": [{ "condition": "Anemia", "probability": 2.5 }]
                }),
            )
            .unwrap_err();
        assert_eq!(err.path, "specific_risks[0].probability");
    }

    #[test]
    fn enum_values_with_spaces_are_normalised() {
        let schema = ResultSchema::for_variant(Variant::TbScreen);
        let conformed = schema
            .conform(
                json!({ "tb_detected": true, "confidence": 0.7, "treatment_urgency": "Within Week" }),
            )
            .unwrap();
        assert_eq!(conformed.value["treatment_urgency"], "within_week");
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = maternal().conform(json!([1, 2])).unwrap_err();
        assert_eq!(err.path, "$");
    }
}
