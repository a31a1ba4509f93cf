//! Score extraction from free-text QA reports.
//!
//! The validation call returns prose that is expected (not guaranteed) to
//! carry a small set of machine-oriented markers: an overall-score line,
//! labeled sub-score lines, and "Gaps" / "Recommendations" list sections.
//! This module is the explicit grammar for those markers. A report with no
//! locatable overall score is a parse failure, never a zero score, and
//! out-of-range values are rejected rather than clamped.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::MetricsRecord;

/// Failure to parse a validation report into metrics
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("validation report contains no overall score marker")]
    MissingOverallScore,

    #[error("overall score {0} is outside the 0-10 scale")]
    ScoreOutOfRange(f64),
}

fn overall_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)overall\s+score\b[^0-9\r\n]*([0-9]+(?:\.[0-9]+)?)(?:\s*/\s*10)?")
            .expect("overall score regex")
    })
}

fn sub_score_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(consistency|completeness|quality|scope\s+adherence)\s+score\b[^0-9\r\n]*([0-9]+(?:\.[0-9]+)?)",
        )
        .expect("sub-score regex")
    })
}

fn section_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:#{1,6}\s*)?\**\s*(gaps|gap\s+analysis|identified\s+gaps|recommendations)\s*\**\s*:?\s*$",
        )
        .expect("section heading regex")
    })
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*]|\d+[.)])\s+(.+?)\s*$").expect("list item regex"))
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Gaps,
    Recommendations,
}

/// Parse a raw validation report into a `MetricsRecord`.
///
/// The overall score is authoritative: it is taken from its marker as-is and
/// never recomputed from sub-scores. Sub-scores and list sections are
/// optional; their absence is tolerated.
pub fn extract(raw: &str) -> Result<MetricsRecord, ExtractError> {
    let caps = overall_re()
        .captures(raw)
        .ok_or(ExtractError::MissingOverallScore)?;

    let overall_score: f64 = caps[1]
        .parse()
        .map_err(|_| ExtractError::MissingOverallScore)?;

    if !(0.0..=10.0).contains(&overall_score) {
        return Err(ExtractError::ScoreOutOfRange(overall_score));
    }

    let mut sub_scores = BTreeMap::new();
    for caps in sub_score_re().captures_iter(raw) {
        let key = normalize_label(&caps[1]);
        if let Ok(value) = caps[2].parse::<f64>() {
            // First occurrence of each label wins
            sub_scores.entry(key).or_insert(value);
        }
    }

    let (gaps, recommendations) = extract_sections(raw);

    Ok(MetricsRecord {
        overall_score,
        sub_scores,
        gaps,
        recommendations,
        raw_text: raw.to_string(),
    })
}

/// Lowercase a sub-score label and collapse whitespace to underscores
fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Collect ordered list items under the "Gaps" and "Recommendations"
/// headings. A section ends at the next heading-like line; prose inside a
/// section is skipped, only list items count.
fn extract_sections(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut gaps = Vec::new();
    let mut recommendations = Vec::new();
    let mut section: Option<Section> = None;

    for line in raw.lines() {
        if let Some(caps) = section_heading_re().captures(line) {
            let label = normalize_label(&caps[1]);
            section = if label == "recommendations" {
                Some(Section::Recommendations)
            } else {
                Some(Section::Gaps)
            };
            continue;
        }

        if let Some(caps) = list_item_re().captures(line) {
            match section {
                Some(Section::Gaps) => gaps.push(caps[1].to_string()),
                Some(Section::Recommendations) => recommendations.push(caps[1].to_string()),
                None => {}
            }
            continue;
        }

        // Any other heading-like line closes the current section
        let trimmed = line.trim();
        if trimmed.starts_with('#') || (trimmed.ends_with(':') && !trimmed.is_empty()) {
            section = None;
        }
    }

    (gaps, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_REPORT: &str = "\
## QA Validation Report

The diagrams are broadly aligned with the slice.

- **Overall Score:** 7.5/10
- **Consistency Score:** 8/10
- **Completeness Score:** 7/10
- **Quality Score:** 8/10
- **Scope Adherence Score:** 9/10

### Gaps:
- Sequence diagram omits the timeout path
- Class diagram is missing the PaymentToken entity

### Recommendations:
1. Add an alt block for the timeout path
2. Introduce PaymentToken with a 1..* relationship
";

    #[test]
    fn test_extract_full_report() {
        let record = extract(FULL_REPORT).unwrap();

        assert_eq!(record.overall_score, 7.5);
        assert_eq!(record.sub_score("consistency"), Some(8.0));
        assert_eq!(record.sub_score("completeness"), Some(7.0));
        assert_eq!(record.sub_score("quality"), Some(8.0));
        assert_eq!(record.sub_score("scope_adherence"), Some(9.0));
        assert_eq!(record.gaps.len(), 2);
        assert_eq!(record.gaps[0], "Sequence diagram omits the timeout path");
        assert_eq!(record.recommendations.len(), 2);
        assert_eq!(
            record.recommendations[1],
            "Introduce PaymentToken with a 1..* relationship"
        );
        assert_eq!(record.raw_text, FULL_REPORT);
    }

    #[test]
    fn test_half_integer_and_plain_scores_normalize() {
        let r = extract("Overall Score: 7.5/10").unwrap();
        assert_eq!(r.overall_score, 7.5);

        let r = extract("overall score 9").unwrap();
        assert_eq!(r.overall_score, 9.0);
    }

    #[test]
    fn test_missing_overall_score_is_a_failure() {
        let report = "Consistency Score: 8/10\nGaps:\n- something\n";
        assert_eq!(extract(report), Err(ExtractError::MissingOverallScore));
    }

    #[test]
    fn test_non_numeric_overall_is_a_failure() {
        assert_eq!(
            extract("Overall Score: N/A"),
            Err(ExtractError::MissingOverallScore)
        );
    }

    #[test]
    fn test_out_of_range_score_is_rejected_not_clamped() {
        assert_eq!(
            extract("Overall Score: 12/10"),
            Err(ExtractError::ScoreOutOfRange(12.0))
        );
    }

    #[test]
    fn test_sub_scores_are_optional() {
        let record = extract("Overall Score: 6/10\nno sub scores here").unwrap();
        assert!(record.sub_scores.is_empty());
    }

    #[test]
    fn test_missing_sections_yield_empty_lists() {
        let record = extract("Overall Score: 6/10").unwrap();
        assert!(record.gaps.is_empty());
        assert!(record.recommendations.is_empty());
    }

    #[test]
    fn test_section_ends_at_next_heading() {
        let report = "\
Overall Score: 5/10

Gaps:
- first gap

Quality Analysis:
- this is analysis prose, not a gap

Recommendations:
- only recommendation
";
        let record = extract(report).unwrap();
        assert_eq!(record.gaps, vec!["first gap".to_string()]);
        assert_eq!(record.recommendations, vec!["only recommendation".to_string()]);
    }

    #[test]
    fn test_gap_analysis_heading_variant() {
        let report = "Overall Score: 4/10\n### Gap Analysis\n- missing actor\n";
        let record = extract(report).unwrap();
        assert_eq!(record.gaps, vec!["missing actor".to_string()]);
    }
}
