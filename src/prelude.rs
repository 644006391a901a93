//! Prelude module for convenient imports
//!
//! Re-exports the types most callers need to build formulas, publish scenarios and take
//! decisions.

// Formulas
pub use crate::ast::{EvaluationTrace, Expression, FieldType, OperatorRecord, Value, ValueType, operand};

// Data
pub use crate::accessor::{DataAccessor, ScopedDataAccessor};
pub use crate::data::{DataModel, DataType, Payload, Table};

// Evaluation
pub use crate::evaluator::{evaluate, evaluate_with_trace};
pub use crate::trace::TraceFormatter;

// Scenarios and decisions
pub use crate::decision::{
    BatchExecutor, BatchReport, CancellationFlag, Decision, DecisionEngine, Outcome, ScenarioEvaluation,
};
pub use crate::scenario::{
    CreateRuleInput, CreateScenarioInput, CreateScenarioIterationInput, IterationState,
    PublicationAction, PublicationActionInput, Scenario, ScenarioIteration, ScenarioPublication,
    ScenarioPublisher,
};

// Storage
pub use crate::repository::memory::{
    InMemoryDataModelRepository, InMemoryIngestedData, InMemoryScenarioRepository,
};
pub use crate::repository::{DataModelRepository, IngestedDataReader, ScenarioRepository};

// Configuration and errors
pub use crate::config::EngineConfig;
pub use crate::error::{EvaluationError, PublicationError, SerializationError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
