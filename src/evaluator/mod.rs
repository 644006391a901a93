use crate::accessor::DataAccessor;
use crate::ast::{EvaluationTrace, Expression, Value};
use crate::error::EvaluationError;
use crate::trace::TraceFormatter;

mod engine;

use engine::AstEngine;

/// Evaluates `expression` against `accessor` and returns the value of the root node.
///
/// The tree is validated first, so a malformed tree fails with
/// [`EvaluationError::MalformedExpression`] before any field is read. Reads are lazy:
/// operands skipped by `AND`/`OR` short-circuiting never reach the accessor.
pub fn evaluate(expression: &Expression, accessor: &dyn DataAccessor) -> Result<Value, EvaluationError> {
    let trace = evaluate_with_trace(expression, accessor)?;
    trace.outcome().cloned().ok_or_else(|| {
        EvaluationError::MalformedExpression(format!("{}: produced no value", expression.discriminator()))
    })
}

/// Same as [`evaluate`], keeping the record of every visited node.
pub fn evaluate_with_trace(
    expression: &Expression,
    accessor: &dyn DataAccessor,
) -> Result<EvaluationTrace, EvaluationError> {
    expression.validate()?;
    AstEngine::new(accessor).evaluate(expression)
}

/// Evaluates and renders the trace as a one-line explanation.
pub fn explain(expression: &Expression, accessor: &dyn DataAccessor) -> Result<String, EvaluationError> {
    evaluate_with_trace(expression, accessor).map(|trace| TraceFormatter::format_trace(&trace))
}

/// Evaluates a boolean formula such as a trigger condition or a rule.
pub fn evaluate_bool(expression: &Expression, accessor: &dyn DataAccessor) -> Result<bool, EvaluationError> {
    match evaluate(expression, accessor)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::TypeMismatch {
            operation: expression.discriminator().to_string(),
            expected: "Bool".to_string(),
            found: other,
        }),
    }
}
