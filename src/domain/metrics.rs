//! Structured QA metrics parsed from a validation report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The structured result of one QA/validation pass.
///
/// Produced by the score extractor; never mutated afterwards. A report from
/// which no overall score can be located never becomes a `MetricsRecord` —
/// that is a parse failure, not a zero score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// The single 0-10 judgment driving convergence (integer or half-integer)
    pub overall_score: f64,

    /// Named sub-scores found in the report (consistency, completeness,
    /// quality, scope_adherence, ...). Absence of any key is tolerated.
    pub sub_scores: BTreeMap<String, f64>,

    /// Free-text findings, in report order (assumed priority order)
    pub gaps: Vec<String>,

    /// Free-text action items, in report order
    pub recommendations: Vec<String>,

    /// The untouched report text, kept for audit
    pub raw_text: String,
}

impl MetricsRecord {
    /// Look up a sub-score by its snake_case key
    pub fn sub_score(&self, key: &str) -> Option<f64> {
        self.sub_scores.get(key).copied()
    }

    /// Check whether this record carries any actionable feedback
    pub fn has_feedback(&self) -> bool {
        !self.gaps.is_empty() || !self.recommendations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_serialization_round_trip() {
        let record = MetricsRecord {
            overall_score: 7.5,
            sub_scores: [("consistency".to_string(), 8.0)].into_iter().collect(),
            gaps: vec!["missing error path".to_string()],
            recommendations: vec!["add an alt block".to_string()],
            raw_text: "Overall Score: 7.5/10".to_string(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: MetricsRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, record);
        assert_eq!(parsed.sub_score("consistency"), Some(8.0));
        assert!(parsed.has_feedback());
    }
}
