//! Unit tests for values, data models, payloads and the small state enums.
mod common;
use common::*;
use risk_engine::decision::RuleExecutionError;
use risk_engine::error::{DataModelError, EvaluationError, PublicationError};
use risk_engine::prelude::*;
use risk_engine::scenario::validate_iteration;
use serde_json::json;

#[test]
fn test_value_display() {
    assert_eq!(format!("{}", Value::Float(42.0)), "42");
    assert_eq!(format!("{}", Value::Float(-0.5)), "-0.5");
    assert_eq!(format!("{}", Value::Bool(true)), "true");
    assert_eq!(format!("{}", Value::from("EUR")), "\"EUR\"");
    assert_eq!(
        format!("{}", Value::StringList(vec!["a".to_string(), "b".to_string()])),
        r#"["a", "b"]"#
    );
}

#[test]
fn test_data_model_validation() {
    assert!(create_data_model().validate().is_ok());

    let dangling_table = DataModel::new([Table::new("transactions")
        .with_field("account_id", DataType::String, true)
        .with_link("account", "accounts", "object_id", "account_id")]);
    assert_eq!(
        dangling_table.validate(),
        Err(DataModelError::UnknownTable("accounts".to_string()))
    );

    let dangling_field = DataModel::new([
        Table::new("transactions").with_link("account", "accounts", "object_id", "account_id"),
        Table::new("accounts").with_field("object_id", DataType::String, false),
    ]);
    assert!(matches!(
        dangling_field.validate(),
        Err(DataModelError::UnknownField { ref field, .. }) if field == "account_id"
    ));
}

#[test]
fn test_follow_links() {
    let model = create_data_model();
    let path = vec!["account".to_string(), "company".to_string()];
    assert_eq!(model.follow_links("transactions", &path).unwrap().name, "companies");
    assert_eq!(model.follow_links("transactions", &[]), Err(DataModelError::EmptyLinkPath));
    assert!(matches!(
        model.follow_links("accounts", &path),
        Err(DataModelError::UnknownLink { ref link, .. }) if link == "account"
    ));
}

#[test]
fn test_data_model_json() {
    let model: DataModel = serde_json::from_value(json!({
        "tables": {
            "transactions": {
                "name": "transactions",
                "fields": {
                    "object_id": {"data_type": "string"},
                    "amount": {"data_type": "float", "nullable": true}
                }
            }
        }
    }))
    .unwrap();

    let table = model.table("transactions").unwrap();
    assert_eq!(table.field("amount").unwrap().data_type, DataType::Float);
    assert!(!table.field("object_id").unwrap().nullable);
    assert!(table.links_to_single.is_empty());
}

#[test]
fn test_payload_parsing() {
    let model = create_data_model();
    let table = model.table("transactions").unwrap();

    let payload = Payload::from_json(
        table,
        json!({
            "object_id": "tx-1",
            "amount": 12.5,
            "installments": 4,
            "currency": null,
            "updated_at": "2024-05-01T10:00:00+02:00",
            "not_in_model": [1, 2, 3]
        }),
    )
    .unwrap();

    assert_eq!(payload.table_name, "transactions");
    assert_eq!(payload.object_id(), Some("tx-1"));
    assert_eq!(payload.get("amount"), Some(&Value::Float(12.5)));
    assert_eq!(payload.get("installments"), Some(&Value::Float(4.0)));
    assert_eq!(payload.get("currency"), None);
    assert_eq!(payload.get("not_in_model"), None);
    assert_eq!(payload.get("updated_at"), Some(&Value::from("2024-05-01T10:00:00+02:00")));
}

#[test]
fn test_invalid_payloads() {
    let model = create_data_model();
    let table = model.table("transactions").unwrap();

    let invalid = [
        json!(["tx-1"]),
        json!({"amount": 1.0}),
        json!({"object_id": null}),
        json!({"object_id": "tx-1", "amount": "12"}),
        json!({"object_id": "tx-1", "installments": 1.5}),
        json!({"object_id": "tx-1", "is_flagged": "yes"}),
        json!({"object_id": "tx-1", "updated_at": "yesterday"}),
    ];
    for raw in invalid {
        assert!(
            matches!(Payload::from_json(table, raw.clone()), Err(DataModelError::InvalidPayload { .. })),
            "accepted {}",
            raw
        );
    }
}

#[test]
fn test_rule_execution_error_codes() {
    let cases = [
        (EvaluationError::RequiredFieldMissing("a".to_string()), 200),
        (EvaluationError::InconsistentWithDataModel("a".to_string()), 201),
        (EvaluationError::DbReadError("a".to_string()), 202),
        (EvaluationError::MalformedExpression("a".to_string()), 203),
        (
            EvaluationError::TypeMismatch {
                operation: "==".to_string(),
                expected: "Float".to_string(),
                found: Value::Bool(true),
            },
            204,
        ),
        (EvaluationError::DivisionByZero("DIVIDE_FLOAT".to_string()), 205),
    ];
    for (error, code) in cases {
        let rule_error = RuleExecutionError::from(&error);
        assert_eq!(rule_error.code(), code);
        assert_eq!(RuleExecutionError::try_from(code), Ok(rule_error));
        assert_eq!(serde_json::to_value(rule_error).unwrap(), json!(code));
    }
    assert!(RuleExecutionError::try_from(299).is_err());
}

#[test]
fn test_iteration_state_transitions() {
    use IterationState::*;

    assert!(Draft.validate_transition(Live).is_ok());
    assert!(Live.validate_transition(Superseded).is_ok());
    assert!(Live.validate_transition(Unpublished).is_ok());
    assert!(Superseded.validate_transition(Live).is_ok());
    assert!(Unpublished.validate_transition(Live).is_ok());

    assert_eq!(
        Live.validate_transition(Draft),
        Err(PublicationError::InvalidStateTransition {
            from: "live",
            to: "draft"
        })
    );
    assert!(Draft.validate_transition(Superseded).is_err());
    assert!(Superseded.validate_transition(Unpublished).is_err());
    assert!(Live.validate_transition(Live).is_err());

    assert!(Draft.is_editable());
    assert!(!Superseded.is_editable());
    for state in [Draft, Live, Superseded, Unpublished] {
        assert_eq!(state.as_str().parse::<IterationState>(), Ok(state));
    }
    assert!(matches!("archived".parse::<IterationState>(), Err(PublicationError::BadParameter(_))));
}

#[test]
fn test_publication_action_parsing() {
    assert_eq!("publish".parse::<PublicationAction>(), Ok(PublicationAction::Publish));
    assert_eq!("unpublish".parse::<PublicationAction>(), Ok(PublicationAction::Unpublish));
    assert!(matches!("Publish".parse::<PublicationAction>(), Err(PublicationError::BadParameter(_))));
    assert_eq!(PublicationAction::Unpublish.to_string(), "unpublish");
}

#[test]
fn test_validate_iteration_against_data_model() {
    let fixture = Fixture::new();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(
        &scenario,
        gt(payload_float("amount"), float(0.0)),
        vec![
            ("Fine", Expression::db_field(FieldType::Bool, &["account"], "is_frozen"), 1),
            ("Unknown field", gt(payload_float("fee"), float(0.0)), 1),
            ("Unknown link", Expression::db_field(FieldType::Bool, &["merchant"], "is_frozen"), 1),
            ("Wrong type", gt(payload_float("currency"), float(0.0)), 1),
        ],
        10,
        30,
    );

    let report = validate_iteration(&iteration, &fixture.data_model, "transactions");
    assert!(!report.is_valid());
    assert!(report.errors.is_empty());
    assert!(report.trigger_errors.is_empty());

    let error_counts: Vec<(&str, usize)> = report
        .rule_errors
        .iter()
        .map(|rule| (rule.rule_name.as_str(), rule.errors.len()))
        .collect();
    assert_eq!(
        error_counts,
        vec![("Fine", 0), ("Unknown field", 1), ("Unknown link", 1), ("Wrong type", 1)]
    );
    assert!(report.rule_errors[1].errors[0].starts_with("$fee"));
    assert_eq!(report.problems().len(), 3);

    let wrong_table = validate_iteration(&iteration, &fixture.data_model, "refunds");
    assert!(!wrong_table.errors.is_empty());
}
