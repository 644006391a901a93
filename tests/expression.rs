//! Tests for the expression tree: shape validation, static types and field reads.
mod common;
use common::*;
use risk_engine::ast::FieldRead;
use risk_engine::prelude::*;

#[test]
fn test_return_types() {
    assert_eq!(Expression::True.return_type(), ValueType::Bool);
    assert_eq!(string("EUR").return_type(), ValueType::String);
    assert_eq!(float(1.5).return_type(), ValueType::Float);
    assert_eq!(string_list(&["a"]).return_type(), ValueType::StringList);
    assert_eq!(payload_float("amount").return_type(), ValueType::Float);
    assert_eq!(
        Expression::db_field(FieldType::String, &["account"], "company_id").return_type(),
        ValueType::String
    );
    assert_eq!(gt(float(1.0), float(2.0)).return_type(), ValueType::Bool);
    assert_eq!(
        Expression::DivideFloat(operand(float(1.0)), operand(float(2.0))).return_type(),
        ValueType::Float
    );
    assert_eq!(in_list(string("a"), string_list(&["a"])).return_type(), ValueType::Bool);
}

#[test]
fn test_valid_nested_tree() {
    let formula = Expression::and(vec![
        gt(payload_float("amount"), float(1000.0)),
        Expression::not(eq_string(payload_string("currency"), string("EUR"))),
        in_list(
            Expression::db_field(FieldType::String, &["account", "company"], "name"),
            string_list(&["Acme", "Globex"]),
        ),
    ]);
    assert!(formula.validate().is_ok());
    assert!(formula.is_valid());
}

#[test]
fn test_empty_variadic_is_malformed() {
    let err = Expression::And(vec![]).validate().unwrap_err();
    assert!(matches!(err, EvaluationError::MalformedExpression(ref m) if m.starts_with("AND:")));
    assert!(!Expression::Or(vec![]).is_valid());
}

#[test]
fn test_null_operand_is_malformed() {
    let err = Expression::GreaterFloat(operand(float(1.0)), None)
        .validate()
        .unwrap_err();
    assert!(matches!(err, EvaluationError::MalformedExpression(ref m) if m.contains("operand 1 is null")));

    let nested_null = Expression::Or(vec![Some(Expression::True), None]);
    assert!(!nested_null.is_valid());
}

#[test]
fn test_wrong_child_type_is_malformed() {
    // A string cannot feed a float comparison.
    let formula = gt(string("abc"), float(1.0));
    let err = formula.validate().unwrap_err();
    assert!(matches!(err, EvaluationError::MalformedExpression(ref m) if m.starts_with("GREATER_FLOAT:")));

    // A float cannot be an AND operand.
    assert!(!Expression::and(vec![float(1.0)]).is_valid());

    // Errors deep in the tree surface too.
    let deep = Expression::and(vec![Expression::True, Expression::not(payload_float("amount"))]);
    assert!(!deep.is_valid());
}

#[test]
fn test_empty_field_name_is_malformed() {
    assert!(!payload_float("").is_valid());
    assert!(!Expression::db_field(FieldType::Bool, &["account"], "").is_valid());
}

#[test]
fn test_empty_db_path_is_not_a_shape_error() {
    // An empty link path is a data model problem, reported when the read is resolved.
    let read = Expression::db_field(FieldType::Float, &[], "balance");
    assert!(gt(read, float(0.0)).is_valid());
}

#[test]
fn test_collect_field_reads_in_depth_first_order() {
    let formula = Expression::or(vec![
        gt(payload_float("amount"), float(10.0)),
        Expression::and(vec![
            Expression::db_field(FieldType::Bool, &["account"], "is_frozen"),
            eq_string(payload_string("currency"), string("USD")),
        ]),
    ]);

    let mut reads = Vec::new();
    formula.collect_field_reads(&mut reads);
    let rendered: Vec<String> = reads.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["$amount", "$account.is_frozen", "$currency"]);
    assert!(matches!(
        reads[1],
        FieldRead::Db {
            field_type: FieldType::Bool,
            ..
        }
    ));
}

#[test]
fn test_tree_display() {
    let formula = Expression::And(vec![Some(gt(payload_float("amount"), float(1000.0))), None]);
    let expected = "\
AND
├── GREATER_FLOAT
│   ├── PAYLOAD_FIELD_FLOAT $amount
│   └── FLOAT_VALUE 1000
└── <null>
";
    assert_eq!(formula.to_string(), expected);
}
