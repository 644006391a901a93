//! Rule scoring and the immutable decision record.

pub mod batch;
pub mod engine;

pub use batch::{BatchExecutor, BatchFailure, BatchReport, CancellationFlag, export_ndjson};
pub use engine::{DecisionEngine, NotTriggeredReason, ScenarioEvaluation};

use crate::error::EvaluationError;
use crate::scenario::Rule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approve,
    Review,
    Reject,
}

impl Outcome {
    /// `score < review` approves, `review <= score < reject` reviews, anything higher
    /// rejects.
    pub fn from_score(score: i64, review_threshold: i64, reject_threshold: i64) -> Self {
        if score >= reject_threshold {
            Outcome::Reject
        } else if score >= review_threshold {
            Outcome::Review
        } else {
            Outcome::Approve
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Outcome::Approve => "approve",
            Outcome::Review => "review",
            Outcome::Reject => "reject",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rule could not be evaluated. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum RuleExecutionError {
    FieldEmptyOrMissing,
    InconsistentWithDataModel,
    DatabaseRead,
    MalformedFormula,
    TypeMismatch,
    DivisionByZero,
}

impl RuleExecutionError {
    pub const fn code(&self) -> u16 {
        match self {
            Self::FieldEmptyOrMissing => 200,
            Self::InconsistentWithDataModel => 201,
            Self::DatabaseRead => 202,
            Self::MalformedFormula => 203,
            Self::TypeMismatch => 204,
            Self::DivisionByZero => 205,
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::FieldEmptyOrMissing => "A field in rule is empty or missing",
            Self::InconsistentWithDataModel => "A field in rule does not match the data model",
            Self::DatabaseRead => "A field in rule could not be read from the database",
            Self::MalformedFormula => "The rule formula is malformed",
            Self::TypeMismatch => "A value in rule has an unexpected type",
            Self::DivisionByZero => "The rule divides by zero",
        }
    }
}

impl From<&EvaluationError> for RuleExecutionError {
    fn from(error: &EvaluationError) -> Self {
        match error {
            EvaluationError::RequiredFieldMissing(_) => Self::FieldEmptyOrMissing,
            EvaluationError::InconsistentWithDataModel(_) => Self::InconsistentWithDataModel,
            EvaluationError::DbReadError(_) => Self::DatabaseRead,
            EvaluationError::MalformedExpression(_) => Self::MalformedFormula,
            EvaluationError::TypeMismatch { .. } => Self::TypeMismatch,
            EvaluationError::DivisionByZero(_) => Self::DivisionByZero,
        }
    }
}

impl From<RuleExecutionError> for u16 {
    fn from(error: RuleExecutionError) -> Self {
        error.code()
    }
}

impl TryFrom<u16> for RuleExecutionError {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(Self::FieldEmptyOrMissing),
            201 => Ok(Self::InconsistentWithDataModel),
            202 => Ok(Self::DatabaseRead),
            203 => Ok(Self::MalformedFormula),
            204 => Ok(Self::TypeMismatch),
            205 => Ok(Self::DivisionByZero),
            _ => Err(format!("unknown rule execution error code {}", code)),
        }
    }
}

impl fmt::Display for RuleExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// The parts of a rule copied into a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub score_modifier: i64,
}

impl From<&Rule> for RuleSnapshot {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id,
            name: rule.name.clone(),
            description: rule.description.clone(),
            score_modifier: rule.score_modifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleExecution {
    pub rule: RuleSnapshot,
    pub result: bool,
    pub result_score_modifier: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RuleExecutionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RuleExecution {
    pub fn from_result(rule: &Rule, result: Result<bool, EvaluationError>) -> Self {
        match result {
            Ok(result) => Self {
                rule: rule.into(),
                result,
                result_score_modifier: if result { rule.score_modifier } else { 0 },
                error: None,
                error_message: None,
            },
            Err(e) => Self {
                rule: rule.into(),
                result: false,
                result_score_modifier: 0,
                error: Some(RuleExecutionError::from(&e)),
                error_message: Some(e.to_string()),
            },
        }
    }
}

/// Non-fatal problem recorded on a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionError {
    /// At least one rule failed to evaluate and contributed nothing.
    RuleExecutionFailed,
}

/// The object a decision was taken on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientObject {
    pub table_name: String,
    pub data: serde_json::Value,
}

/// The immutable outcome of evaluating one object against one scenario iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub organization_id: Uuid,
    pub client_object: ClientObject,
    pub scenario_id: Uuid,
    pub scenario_iteration_id: Uuid,
    pub scenario_name: String,
    pub scenario_description: String,
    pub scenario_version: u32,
    pub score_review_threshold: i64,
    pub score_reject_threshold: i64,
    pub score: i64,
    pub outcome: Outcome,
    pub rule_executions: Vec<RuleExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<DecisionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_execution_id: Option<Uuid>,
}

impl Decision {
    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleExecution> {
        self.rule_executions
            .iter()
            .filter(|execution| execution.error.is_some())
    }
}
