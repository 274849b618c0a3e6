//! Structured-result extraction from untrusted model text.
//!
//! [`extract`] never fails: when no usable JSON object can be recovered the
//! variant's fallback is returned together with the reason, which callers may
//! surface as a diagnostic.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::inference::RawCompletion;
use crate::request::Variant;
use crate::result::StructuredResult;
use crate::schema::ResultSchema;

/// Returns the first balanced `{ ... }` object in `text`.
///
/// Braces inside JSON string literals are ignored. When the text holds several
/// top-level objects only the first is returned, which is ambiguous if the
/// model echoed an example before its real answer. An opening brace that is
/// never closed yields `None`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Why the fallback was used instead of the model's answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    NoJsonObject,
    MalformedJson(String),
    SchemaMismatch(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoJsonObject => f.write_str("no JSON object in model output"),
            FallbackReason::MalformedJson(e) => write!(f, "malformed JSON: {e}"),
            FallbackReason::SchemaMismatch(e) => write!(f, "schema mismatch: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub result: StructuredResult,
    pub fallback: Option<FallbackReason>,
    /// Optional fields the model left out and that carry neutral values.
    pub filled_fields: Vec<String>,
}

impl Extraction {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Parses `raw` into the structured result for `variant`.
pub fn extract(raw: &RawCompletion, variant: Variant) -> Extraction {
    match try_extract(&raw.text, variant) {
        Ok((result, filled_fields)) => {
            if !filled_fields.is_empty() {
                debug!(variant = %variant, filled = ?filled_fields, "Partial model answer");
            }
            Extraction {
                result,
                fallback: None,
                filled_fields,
            }
        }
        Err(reason) => {
            warn!(variant = %variant, reason = %reason, "Using fallback result");
            debug!(variant = %variant, raw = %raw.text, "Unusable model output");
            Extraction {
                result: StructuredResult::fallback(variant),
                fallback: Some(reason),
                filled_fields: Vec::new(),
            }
        }
    }
}

fn try_extract(
    text: &str,
    variant: Variant,
) -> Result<(StructuredResult, Vec<String>), FallbackReason> {
    let candidate = extract_json_object(text).ok_or(FallbackReason::NoJsonObject)?;

    let parsed: Value = serde_json::from_str(candidate)
        .map_err(|e| FallbackReason::MalformedJson(e.to_string()))?;

    let conformed = ResultSchema::for_variant(variant)
        .conform(parsed)
        .map_err(|v| FallbackReason::SchemaMismatch(v.to_string()))?;

    let result = StructuredResult::from_value(variant, conformed.value)
        .map_err(|e| FallbackReason::SchemaMismatch(e.to_string()))?;
    Ok((result, conformed.filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{RiskLevel, Severity};
    use std::time::Duration;

    fn raw(text: &str) -> RawCompletion {
        RawCompletion::new(text, Duration::from_millis(5))
    }

    const CRITICAL_MATERNAL: &str = r#"Here is the assessment:
```json
{
  "overall_risk": "critical",
  "risk_score": 9,
  "specific_risks": [
    {
      "condition": "Preeclampsia",
      "probability": 0.85,
      "warning_signs": ["Severe headache", "Blurred vision"],
      "timeline": "Immediate"
    }
  ],
  "immediate_actions": ["Admit to hospital"],
  "dietary_recommendations": ["Reduce salt intake"],
  "monitoring_frequency": "daily",
  "requires_hospital_admission": true,
  "follow_up_tests": ["Urine protein"],
  "estimated_delivery_complications": "high"
}
```
Please consult a specialist."#;

    #[test]
    fn finds_object_surrounded_by_prose() {
        let text = "Sure! {\"a\": {\"b\": 1}} hope that helps";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let text = r#"{"note": "use } and { freely", "ok": true} trailing }"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"note": "use } and { freely", "ok": true}"#)
        );
    }

    #[test]
    fn returns_only_the_first_of_several_objects() {
        let text = r#"{"first": 1} and then {"second": 2}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"first": 1}"#));
    }

    #[test]
    fn unbalanced_or_missing_braces_yield_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"open\": true"), None);
        assert_eq!(extract_json_object("closing only }"), None);
    }

    #[test]
    fn critical_maternal_answer_is_not_replaced_by_fallback() {
        let extraction = extract(&raw(CRITICAL_MATERNAL), Variant::MaternalRisk);

        assert!(!extraction.used_fallback());
        match extraction.result {
            StructuredResult::MaternalRisk(assessment) => {
                assert_eq!(assessment.overall_risk, RiskLevel::Critical);
                assert_eq!(assessment.risk_score, 9);
                assert!(assessment.requires_hospital_admission);
                assert_eq!(assessment.specific_risks[0].condition, "Preeclampsia");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn text_without_json_yields_fallback() {
        let extraction = extract(&raw("I cannot help with that."), Variant::SymptomCheck);
        assert_eq!(extraction.fallback, Some(FallbackReason::NoJsonObject));
        assert_eq!(
            extraction.result,
            StructuredResult::fallback(Variant::SymptomCheck)
        );
    }

    #[test]
    fn malformed_json_yields_fallback() {
        let extraction = extract(
            &raw("{\"overall_risk\": \"high\", risk_score: 7,}"),
            Variant::MaternalRisk,
        );
        assert!(matches!(
            extraction.fallback,
            Some(FallbackReason::MalformedJson(_))
        ));
        assert_eq!(
            extraction.result,
            StructuredResult::fallback(Variant::MaternalRisk)
        );
    }

    #[test]
    fn schema_mismatch_yields_fallback() {
        let extraction = extract(
            &raw(r#"{"overall_risk": "apocalyptic", "risk_score": 3, "requires_hospital_admission": false}"#),
            Variant::MaternalRisk,
        );
        assert!(matches!(
            extraction.fallback,
            Some(FallbackReason::SchemaMismatch(_))
        ));
        assert_eq!(
            extraction.result,
            StructuredResult::fallback(Variant::MaternalRisk)
        );
    }

    #[test]
    fn partial_answer_gets_neutral_values_not_fallback_advice() {
        let extraction = extract(
            &raw(r#"{"severity_assessment": "Severe", "requires_hospital": true, "requires_emergency": false}"#),
            Variant::SymptomCheck,
        );

        assert!(!extraction.used_fallback());
        assert!(extraction.filled_fields.contains(&"nearest_facility".to_string()));
        let StructuredResult::Symptom(assessment) = extraction.result else {
            panic!("expected a symptom assessment");
        };
        assert_eq!(assessment.severity_assessment, Severity::Severe);
        assert!(assessment.requires_hospital);
        assert_eq!(assessment.nearest_facility, "");
        assert!(assessment.differential_diagnosis.is_empty());
    }

    #[test]
    fn partial_critical_maternal_answer_carries_no_routine_advice() {
        let extraction = extract(
            &raw(r#"{"overall_risk":"critical","risk_score":9,"requires_hospital_admission":true}"#),
            Variant::MaternalRisk,
        );

        assert!(!extraction.used_fallback());
        let value = extraction.result.to_value();
        assert_eq!(value["overall_risk"], "critical");
        assert_eq!(value["immediate_actions"], serde_json::json!([]));
        assert!(!value.to_string().contains("Schedule regular checkups"));
        for field in [
            "immediate_actions",
            "monitoring_frequency",
            "estimated_delivery_complications",
        ] {
            assert!(
                extraction.filled_fields.iter().any(|f| f == field),
                "{field} not reported as filled"
            );
        }
    }

    #[test]
    fn complete_answer_reports_no_filled_fields() {
        let extraction = extract(&raw(CRITICAL_MATERNAL), Variant::MaternalRisk);
        assert!(extraction.filled_fields.is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        for text in [CRITICAL_MATERNAL, "nothing", "{broken"] {
            let first = extract(&raw(text), Variant::MaternalRisk);
            let second = extract(&raw(text), Variant::MaternalRisk);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn every_variant_survives_garbage() {
        for variant in Variant::ALL {
            for text in ["", "}{", "{\"x\": [1, 2", "{\"x\": 1}", "[1, 2, 3]"] {
                let extraction = extract(&raw(text), variant);
                assert!(extraction.used_fallback(), "{variant} accepted {text:?}");
                assert_eq!(extraction.result.variant(), variant);
            }
        }
    }
}
