//! Joining criteria: who may enter a group
//!
//! A criterion is a named predicate over a candidate project's attributes.
//! Required criteria AND-combine to gate admission; non-required criteria
//! are advisory and only surfaced to the inviter. The candidate's
//! attributes come from the external bid-card service as an opaque bag —
//! this engine performs no scoring of its own.

use crate::ids::{ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single attribute value supplied by the bid-card service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Date(DateTime<Utc>),
}

/// A candidate project, as seen by the criteria validator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateProject {
    /// The project (bid card) identity
    pub project_id: ProjectId,
    /// The owning homeowner
    pub owner: UserId,
    /// Attribute bag from the bid-card service
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

impl CandidateProject {
    pub fn new(project_id: ProjectId, owner: UserId) -> Self {
        Self {
            project_id,
            owner,
            attributes: HashMap::new(),
        }
    }

    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.attributes
            .insert(key.into(), AttributeValue::Number(value));
        self
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: bool) -> Self {
        self.attributes
            .insert(key.into(), AttributeValue::Flag(value));
        self
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into(), AttributeValue::Text(value.into()));
        self
    }

    pub fn with_date(mut self, key: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.attributes
            .insert(key.into(), AttributeValue::Date(value));
        self
    }
}

/// Predicate kinds a criterion can express
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionPredicate {
    /// Numeric attribute within [min, max] (either bound optional)
    NumericRange {
        attribute: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Boolean attribute must equal the expected value
    Boolean { attribute: String, expected: bool },
    /// Text attribute must contain the pattern (case-insensitive)
    TextMatch { attribute: String, pattern: String },
    /// Date attribute within bounds (either bound optional)
    DateBound {
        attribute: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        not_before: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        not_after: Option<DateTime<Utc>>,
    },
}

impl CriterionPredicate {
    /// Evaluate against a candidate. A missing or wrongly-typed attribute
    /// fails the predicate.
    pub fn evaluate(&self, candidate: &CandidateProject) -> bool {
        match self {
            CriterionPredicate::NumericRange {
                attribute,
                min,
                max,
            } => match candidate.attributes.get(attribute) {
                Some(AttributeValue::Number(v)) => {
                    min.map_or(true, |m| *v >= m) && max.map_or(true, |m| *v <= m)
                }
                _ => false,
            },
            CriterionPredicate::Boolean {
                attribute,
                expected,
            } => matches!(
                candidate.attributes.get(attribute),
                Some(AttributeValue::Flag(v)) if v == expected
            ),
            CriterionPredicate::TextMatch { attribute, pattern } => {
                match candidate.attributes.get(attribute) {
                    Some(AttributeValue::Text(v)) => {
                        v.to_lowercase().contains(&pattern.to_lowercase())
                    }
                    _ => false,
                }
            }
            CriterionPredicate::DateBound {
                attribute,
                not_before,
                not_after,
            } => match candidate.attributes.get(attribute) {
                Some(AttributeValue::Date(v)) => {
                    not_before.map_or(true, |b| *v >= b) && not_after.map_or(true, |b| *v <= b)
                }
                _ => false,
            },
        }
    }
}

/// A named joining criterion attached to a group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoiningCriterion {
    /// Criterion name, unique within the group
    pub name: String,
    /// Required criteria block admission; advisory ones do not
    pub required: bool,
    /// The predicate to evaluate
    pub predicate: CriterionPredicate,
}

impl JoiningCriterion {
    pub fn required(name: impl Into<String>, predicate: CriterionPredicate) -> Self {
        Self {
            name: name.into(),
            required: true,
            predicate,
        }
    }

    pub fn advisory(name: impl Into<String>, predicate: CriterionPredicate) -> Self {
        Self {
            name: name.into(),
            required: false,
            predicate,
        }
    }
}

/// Result of evaluating a candidate against a group's criteria
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinAssessment {
    /// Whether all required criteria passed
    pub admitted: bool,
    /// The first required criterion that failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failed: Option<String>,
    /// Names of advisory (non-required) criteria that failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisory_failures: Vec<String>,
}

impl JoinAssessment {
    /// Evaluate a candidate against an ordered criteria list
    pub fn evaluate(criteria: &[JoiningCriterion], candidate: &CandidateProject) -> Self {
        let mut first_failed = None;
        let mut advisory_failures = Vec::new();

        for criterion in criteria {
            if criterion.predicate.evaluate(candidate) {
                continue;
            }
            if criterion.required {
                if first_failed.is_none() {
                    first_failed = Some(criterion.name.clone());
                }
            } else {
                advisory_failures.push(criterion.name.clone());
            }
        }

        Self {
            admitted: first_failed.is_none(),
            first_failed,
            advisory_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_candidate() -> CandidateProject {
        CandidateProject::new(ProjectId::new("proj-1"), UserId::new("owner-1"))
            .with_number("roof_area_sqm", 120.0)
            .with_flag("permit_ready", true)
            .with_text("material", "Asphalt Shingle")
            .with_date("desired_start", Utc::now() + Duration::days(30))
    }

    #[test]
    fn test_numeric_range() {
        let p = CriterionPredicate::NumericRange {
            attribute: "roof_area_sqm".into(),
            min: Some(50.0),
            max: Some(200.0),
        };
        assert!(p.evaluate(&make_candidate()));

        let p = CriterionPredicate::NumericRange {
            attribute: "roof_area_sqm".into(),
            min: Some(150.0),
            max: None,
        };
        assert!(!p.evaluate(&make_candidate()));
    }

    #[test]
    fn test_missing_attribute_fails() {
        let p = CriterionPredicate::Boolean {
            attribute: "nonexistent".into(),
            expected: true,
        };
        assert!(!p.evaluate(&make_candidate()));
    }

    #[test]
    fn test_text_match_case_insensitive() {
        let p = CriterionPredicate::TextMatch {
            attribute: "material".into(),
            pattern: "shingle".into(),
        };
        assert!(p.evaluate(&make_candidate()));
    }

    #[test]
    fn test_date_bound() {
        let p = CriterionPredicate::DateBound {
            attribute: "desired_start".into(),
            not_before: Some(Utc::now()),
            not_after: Some(Utc::now() + Duration::days(90)),
        };
        assert!(p.evaluate(&make_candidate()));

        let p = CriterionPredicate::DateBound {
            attribute: "desired_start".into(),
            not_before: None,
            not_after: Some(Utc::now()),
        };
        assert!(!p.evaluate(&make_candidate()));
    }

    #[test]
    fn test_assessment_required_vs_advisory() {
        let criteria = vec![
            JoiningCriterion::required(
                "in-category",
                CriterionPredicate::TextMatch {
                    attribute: "material".into(),
                    pattern: "shingle".into(),
                },
            ),
            JoiningCriterion::advisory(
                "permit-ready",
                CriterionPredicate::Boolean {
                    attribute: "permit_ready".into(),
                    expected: false,
                },
            ),
        ];

        let assessment = JoinAssessment::evaluate(&criteria, &make_candidate());
        assert!(assessment.admitted);
        assert_eq!(assessment.advisory_failures, vec!["permit-ready"]);
    }

    #[test]
    fn test_assessment_reports_first_required_failure() {
        let criteria = vec![
            JoiningCriterion::required(
                "big-enough",
                CriterionPredicate::NumericRange {
                    attribute: "roof_area_sqm".into(),
                    min: Some(500.0),
                    max: None,
                },
            ),
            JoiningCriterion::required(
                "permitted",
                CriterionPredicate::Boolean {
                    attribute: "permit_ready".into(),
                    expected: false,
                },
            ),
        ];

        let assessment = JoinAssessment::evaluate(&criteria, &make_candidate());
        assert!(!assessment.admitted);
        assert_eq!(assessment.first_failed.as_deref(), Some("big-enough"));
    }
}
