use crate::ast::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while turning the `{type, staticData, children}` record format into an
/// `Expression`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializationError {
    #[error("Unknown operator type '{0}'")]
    UnknownOperatorType(String),

    #[error("Malformed expression for operator '{operator}': {message}")]
    MalformedExpression { operator: String, message: String },

    #[error("Failed to parse operator JSON: {0}")]
    Json(String),
}

/// Errors that can occur during the AST evaluation phase.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Malformed expression: {0}")]
    MalformedExpression(String),

    #[error("Field '{0}' is empty or missing")]
    RequiredFieldMissing(String),

    #[error("Field read is inconsistent with the data model: {0}")]
    InconsistentWithDataModel(String),

    #[error("Database read failed: {0}")]
    DbReadError(String),

    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: Value,
    },

    #[error("Division by zero in operation '{0}'")]
    DivisionByZero(String),
}

/// Configuration errors in a data model, or a payload that does not fit its table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataModelError {
    #[error("Table '{0}' not found in the data model")]
    UnknownTable(String),

    #[error("Link '{link}' not found on table '{table}'")]
    UnknownLink { table: String, link: String },

    #[error("Field '{field}' not found on table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("Database field read has an empty link path")]
    EmptyLinkPath,

    #[error("Invalid payload for table '{table}': {message}")]
    InvalidPayload { table: String, message: String },
}

/// Errors surfaced by repository implementations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent modification of scenario '{0}'")]
    Conflict(Uuid),

    #[error("Scenario iteration '{0}' has already been published and can no longer be modified")]
    IterationImmutable(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors of the publish/unpublish state machine. Any error leaves the scenario untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublicationError {
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    #[error("Iteration cannot move from '{from}' to '{to}'")]
    InvalidStateTransition { from: &'static str, to: &'static str },

    #[error("Publication of scenario '{scenario_id}' kept conflicting after {attempts} attempts")]
    PublicationConflict { scenario_id: Uuid, attempts: u32 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors preventing a scenario from being evaluated at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioEvaluationError {
    #[error("Scenario '{0}' has no live iteration")]
    NoLiveIteration(Uuid),

    #[error("Scenario '{scenario_id}' triggers on table '{expected}', but the object belongs to '{found}'")]
    WrongTriggerTable {
        scenario_id: Uuid,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    DataModel(#[from] DataModelError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors while writing decisions out as newline-delimited JSON.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode decision: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write decision: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a batch from starting. Per-object failures go into the batch report.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to build the batch worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors while installing the global tracing subscriber.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log level/filter '{value}': {source}")]
    EnvFilter {
        value: String,
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("Telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Invalid values in the environment configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}
