//! Tests for the evaluation engine, lazy database reads and trace explanations.
mod common;
use common::*;
use risk_engine::evaluator::{evaluate_bool, explain};
use risk_engine::prelude::*;
use serde_json::json;

fn eval_bool(fixture: &Fixture, payload: &Payload, formula: &Expression) -> std::result::Result<bool, EvaluationError> {
    evaluate_bool(formula, &fixture.accessor(payload))
}

#[test]
fn test_logical_operators() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));
    let t = || Expression::True;
    let f = || Expression::False;

    let cases = [
        (Expression::and(vec![t(), t(), t()]), true),
        (Expression::and(vec![t(), t(), f()]), false),
        (Expression::and(vec![f()]), false),
        (Expression::or(vec![f(), f(), f()]), false),
        (Expression::and(vec![t(), t()]), true),
        (Expression::and(vec![t(), f()]), false),
        (Expression::and(vec![f(), t()]), false),
        (Expression::or(vec![f(), f()]), false),
        (Expression::or(vec![f(), t()]), true),
        (Expression::or(vec![t(), f()]), true),
        (Expression::not(t()), false),
        (Expression::not(f()), true),
        (Expression::and(vec![t()]), true),
        (Expression::or(vec![f(), f(), f(), t()]), true),
    ];
    for (formula, expected) in cases {
        assert_eq!(eval_bool(&fixture, &payload, &formula).unwrap(), expected, "{}", formula);
    }
}

#[test]
fn test_comparisons_and_arithmetic() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));
    let accessor = fixture.accessor(&payload);

    assert_eq!(evaluate(&gt(payload_float("amount"), float(1000.0)), &accessor).unwrap(), Value::Bool(true));
    assert_eq!(evaluate(&lt(payload_float("amount"), float(1000.0)), &accessor).unwrap(), Value::Bool(false));
    assert_eq!(
        evaluate(
            &Expression::GreaterOrEqualFloat(operand(payload_float("amount")), operand(float(1500.0))),
            &accessor
        )
        .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        evaluate(
            &Expression::LesserOrEqualFloat(operand(payload_float("amount")), operand(float(1499.0))),
            &accessor
        )
        .unwrap(),
        Value::Bool(false)
    );

    let total = Expression::AddFloat(
        operand(Expression::ProductFloat(operand(payload_float("amount")), operand(float(2.0)))),
        operand(Expression::DivideFloat(operand(float(10.0)), operand(float(4.0)))),
    );
    assert_eq!(evaluate(&total, &accessor).unwrap(), Value::Float(3002.5));

    let difference = Expression::SubtractFloat(operand(float(1.0)), operand(payload_float("amount")));
    assert_eq!(evaluate(&difference, &accessor).unwrap(), Value::Float(-1499.0));
}

#[test]
fn test_equality_is_type_specific() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));

    assert!(eval_bool(&fixture, &payload, &eq_string(payload_string("currency"), string("EUR"))).unwrap());
    assert!(!eval_bool(&fixture, &payload, &eq_string(payload_string("currency"), string("eur"))).unwrap());
    assert!(
        eval_bool(
            &fixture,
            &payload,
            &Expression::EqualBool(operand(payload_bool("is_flagged")), operand(Expression::False))
        )
        .unwrap()
    );
    assert!(eval_bool(&fixture, &payload, &eq_float(payload_float("amount"), float(1500.0))).unwrap());

    // Float equality is exact.
    let sum = Expression::AddFloat(operand(float(0.1)), operand(float(0.2)));
    assert!(!eval_bool(&fixture, &payload, &eq_float(sum, float(0.3))).unwrap());
}

#[test]
fn test_string_is_in_list() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));

    let listed = in_list(payload_string("currency"), string_list(&["USD", "EUR"]));
    assert!(eval_bool(&fixture, &payload, &listed).unwrap());

    let unlisted = in_list(payload_string("currency"), string_list(&["USD", "GBP"]));
    assert!(!eval_bool(&fixture, &payload, &unlisted).unwrap());

    let empty = in_list(payload_string("currency"), string_list(&[]));
    assert!(!eval_bool(&fixture, &payload, &empty).unwrap());
}

#[test]
fn test_int_and_timestamp_fields() {
    let fixture = Fixture::new();
    let mut raw = transaction(10.0);
    raw["installments"] = json!(3);
    let payload = fixture.payload(raw);

    assert!(eval_bool(&fixture, &payload, &gt(payload_float("installments"), float(2.0))).unwrap());
    assert!(
        eval_bool(
            &fixture,
            &payload,
            &eq_string(payload_string("updated_at"), string("2024-05-01T10:00:00Z"))
        )
        .unwrap()
    );
}

#[test]
fn test_missing_payload_field() {
    let fixture = Fixture::new();
    let payload = fixture.payload(json!({"object_id": "tx-2", "amount": null}));

    let err = eval_bool(&fixture, &payload, &gt(payload_float("amount"), float(0.0))).unwrap_err();
    assert_eq!(err, EvaluationError::RequiredFieldMissing("amount".to_string()));
}

#[test]
fn test_field_type_mismatch() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));

    let err = eval_bool(&fixture, &payload, &gt(payload_float("currency"), float(1.0))).unwrap_err();
    assert_eq!(
        err,
        EvaluationError::TypeMismatch {
            operation: "PAYLOAD_FIELD_FLOAT".to_string(),
            expected: "Float".to_string(),
            found: Value::from("EUR"),
        }
    );
}

#[test]
fn test_division_by_zero() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));

    let formula = Expression::DivideFloat(operand(payload_float("amount")), operand(float(0.0)));
    let err = evaluate(&formula, &fixture.accessor(&payload)).unwrap_err();
    assert_eq!(err, EvaluationError::DivisionByZero("DIVIDE_FLOAT".to_string()));
}

#[test]
fn test_malformed_tree_fails_before_reading() {
    let fixture = Fixture::new().with_account_rows();
    let payload = fixture.payload(transaction(1500.0));

    let formula = Expression::And(vec![
        Some(Expression::db_field(FieldType::Bool, &["account"], "is_frozen")),
        None,
    ]);
    let err = eval_bool(&fixture, &payload, &formula).unwrap_err();
    assert!(matches!(err, EvaluationError::MalformedExpression(_)));
    assert_eq!(fixture.ingested.reads(), 0);
    assert_eq!(fixture.ingested.transactions_begun(), 0);
}

#[test]
fn test_non_boolean_formula() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));

    let err = eval_bool(&fixture, &payload, &payload_float("amount")).unwrap_err();
    assert!(matches!(err, EvaluationError::TypeMismatch { ref expected, .. } if expected == "Bool"));
}

#[test]
fn test_short_circuit_skips_database_reads() {
    let fixture = Fixture::new().with_account_rows();
    let payload = fixture.payload(transaction(1500.0));
    let frozen = || {
        Expression::EqualBool(
            operand(Expression::db_field(FieldType::Bool, &["account"], "is_frozen")),
            operand(Expression::True),
        )
    };

    assert!(eval_bool(&fixture, &payload, &Expression::or(vec![Expression::True, frozen()])).unwrap());
    assert!(!eval_bool(&fixture, &payload, &Expression::and(vec![Expression::False, frozen()])).unwrap());
    assert_eq!(fixture.ingested.reads(), 0);
    assert_eq!(fixture.ingested.transactions_begun(), 0);

    assert!(!eval_bool(&fixture, &payload, &Expression::and(vec![Expression::True, frozen()])).unwrap());
    assert_eq!(fixture.ingested.reads(), 1);
}

#[test]
fn test_short_circuit_skips_failing_operands() {
    let fixture = Fixture::new();
    let payload = fixture.payload(json!({"object_id": "tx-3"}));
    let divide_by_zero = gt(
        Expression::DivideFloat(operand(float(1.0)), operand(float(0.0))),
        float(0.0),
    );

    assert!(eval_bool(&fixture, &payload, &Expression::or(vec![Expression::True, divide_by_zero.clone()])).unwrap());
    assert!(!eval_bool(&fixture, &payload, &Expression::and(vec![Expression::False, divide_by_zero])).unwrap());

    let missing = gt(payload_float("amount"), float(0.0));
    assert!(eval_bool(&fixture, &payload, &Expression::or(vec![Expression::True, missing])).unwrap());
}

#[test]
fn test_trace_marks_skipped_operands() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));

    let formula = Expression::or(vec![Expression::True, Expression::False]);
    let trace = evaluate_with_trace(&formula, &fixture.accessor(&payload)).unwrap();
    match trace {
        EvaluationTrace::Variadic {
            op_symbol,
            operands,
            outcome,
        } => {
            assert_eq!(op_symbol, "OR");
            assert_eq!(outcome, Value::Bool(true));
            assert_eq!(operands[1], EvaluationTrace::NotEvaluated);
        }
        other => panic!("expected a variadic trace, got {:?}", other),
    }
}

#[test]
fn test_explain() {
    let fixture = Fixture::new();
    let payload = fixture.payload(transaction(1500.0));
    let accessor = fixture.accessor(&payload);

    let both = Expression::and(vec![
        gt(payload_float("amount"), float(1000.0)),
        eq_string(payload_string("currency"), string("EUR")),
    ]);
    assert_eq!(
        explain(&both, &accessor).unwrap(),
        r#"$amount (was 1500) > 1000 AND $currency (was "EUR") == "EUR""#
    );

    // The skipped operand is left out.
    let either = Expression::or(vec![
        gt(payload_float("amount"), float(1000.0)),
        eq_string(payload_string("currency"), string("USD")),
    ]);
    assert_eq!(explain(&either, &accessor).unwrap(), "$amount (was 1500) > 1000");

    let scaled = gt(
        Expression::ProductFloat(
            operand(Expression::SubtractFloat(operand(payload_float("amount")), operand(float(500.0)))),
            operand(float(2.0)),
        ),
        float(1000.0),
    );
    assert_eq!(
        explain(&scaled, &accessor).unwrap(),
        "($amount (was 1500) - 500) * 2 > 1000"
    );

    let negated = Expression::not(Expression::or(vec![Expression::False, Expression::False]));
    assert_eq!(explain(&negated, &accessor).unwrap(), "NOT (false OR false)");
}
