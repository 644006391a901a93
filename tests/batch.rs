//! Tests for batch executions over many objects.
mod common;
use common::*;
use risk_engine::config::BatchConfig;
use risk_engine::decision::{RuleExecutionError, export_ndjson};
use risk_engine::error::{RepositoryError, ScenarioEvaluationError};
use risk_engine::prelude::*;
use std::result::Result;
use risk_engine::repository::ReadTransaction;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

fn transaction_with_id(object_id: &str, amount: f64) -> serde_json::Value {
    let mut raw = transaction(amount);
    raw["object_id"] = json!(object_id);
    raw
}

fn config(pool_size: usize, max_db_retries: u32) -> BatchConfig {
    BatchConfig {
        pool_size,
        max_db_retries,
    }
}

fn frozen_account_rule() -> Expression {
    Expression::not(Expression::db_field(FieldType::Bool, &["account"], "is_frozen"))
}

#[test]
fn test_batch_keeps_input_order() {
    let fixture = Fixture::new().with_account_rows();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(
        &scenario,
        gt(payload_float("amount"), float(100.0)),
        vec![
            ("Large amount", gt(payload_float("amount"), float(1000.0)), 20),
            ("Account active", frozen_account_rule(), 5),
        ],
        10,
        30,
    );
    let payloads: Vec<Payload> = [("tx-1", 50.0), ("tx-2", 500.0), ("tx-3", 1500.0), ("tx-4", 2000.0), ("tx-5", 80.0)]
        .into_iter()
        .map(|(id, amount)| fixture.payload(transaction_with_id(id, amount)))
        .collect();

    let executor = BatchExecutor::new(fixture.engine(), &config(3, 0)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &CancellationFlag::new());

    assert!(!report.cancelled);
    assert_eq!(report.processed, 5);
    assert_eq!(report.not_triggered, 2);
    assert!(report.failures.is_empty());

    let ids: Vec<&str> = report
        .decisions
        .iter()
        .map(|decision| decision.client_object.data["object_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["tx-2", "tx-3", "tx-4"]);

    let scores: Vec<i64> = report.decisions.iter().map(|decision| decision.score).collect();
    assert_eq!(scores, vec![5, 25, 25]);
    assert!(
        report
            .decisions
            .iter()
            .all(|decision| decision.scheduled_execution_id == Some(report.scheduled_execution_id))
    );
    assert_eq!(fixture.ingested.open_transactions(), 0);
    assert_eq!(fixture.ingested.transactions_begun(), 3);
}

#[test]
fn test_cancelled_batch_evaluates_nothing() {
    let fixture = Fixture::new();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(&scenario, Expression::True, vec![("Always", Expression::True, 1)], 10, 30);
    let payloads: Vec<Payload> = (0..10)
        .map(|n| fixture.payload(transaction_with_id(&format!("tx-{}", n), 10.0)))
        .collect();

    let cancellation = CancellationFlag::new();
    cancellation.cancel();
    let executor = BatchExecutor::new(fixture.engine(), &config(2, 0)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &cancellation);

    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert!(report.decisions.is_empty());
}

/// Cancels the batch when the `cancel_on`th read transaction is opened.
struct CancellingReader<'a> {
    inner: &'a InMemoryIngestedData,
    cancellation: CancellationFlag,
    begun: AtomicUsize,
    cancel_on: usize,
}

impl IngestedDataReader for CancellingReader<'_> {
    fn begin_read<'t>(&'t self, organization_id: Uuid) -> Result<Box<dyn ReadTransaction + 't>, RepositoryError> {
        if self.begun.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_on {
            self.cancellation.cancel();
        }
        self.inner.begin_read(organization_id)
    }
}

#[test]
fn test_cancelling_mid_batch_stops_after_running_objects() {
    let fixture = Fixture::new().with_account_rows();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(
        &scenario,
        Expression::True,
        vec![("Account active", frozen_account_rule(), 5)],
        10,
        30,
    );
    let payloads: Vec<Payload> = (0..10)
        .map(|n| fixture.payload(transaction_with_id(&format!("tx-{}", n), 10.0)))
        .collect();

    let cancellation = CancellationFlag::new();
    let reader = CancellingReader {
        inner: &fixture.ingested,
        cancellation: cancellation.clone(),
        begun: AtomicUsize::new(0),
        cancel_on: 3,
    };
    let engine = DecisionEngine::new(&fixture.data_models, &reader);
    let executor = BatchExecutor::new(engine, &config(1, 0)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &cancellation);

    // The object that triggered the cancellation still completes.
    assert!(report.cancelled);
    assert_eq!(report.processed, 3);
    assert_eq!(report.decisions.len(), 3);
    assert!(report.failures.is_empty());
    assert_eq!(reader.begun.load(Ordering::SeqCst), 3);

    let ids: Vec<&str> = report
        .decisions
        .iter()
        .map(|decision| decision.client_object.data["object_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["tx-0", "tx-1", "tx-2"]);
    assert!(report.decisions.iter().all(|decision| decision.score == 5));
    assert_eq!(fixture.ingested.open_transactions(), 0);
}

#[test]
fn test_failing_objects_do_not_stop_the_batch() {
    let fixture = Fixture::new();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(&scenario, Expression::True, vec![("Always", Expression::True, 1)], 10, 30);
    let account = Payload::from_json(fixture.data_model.table("accounts").unwrap(), json!({"object_id": "acc-1"})).unwrap();
    let payloads = vec![
        fixture.payload(transaction_with_id("tx-1", 10.0)),
        account,
        fixture.payload(transaction_with_id("tx-3", 10.0)),
    ];

    let executor = BatchExecutor::new(fixture.engine(), &config(2, 0)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &CancellationFlag::new());

    assert_eq!(report.processed, 3);
    assert_eq!(report.decisions.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert!(matches!(report.failures[0].error, ScenarioEvaluationError::WrongTriggerTable { .. }));
}

#[test]
fn test_database_read_failures_are_retried() {
    let fixture = Fixture::new().with_account_rows();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(
        &scenario,
        Expression::True,
        vec![("Account active", frozen_account_rule(), 5)],
        10,
        30,
    );
    let payloads = vec![fixture.payload(transaction(10.0))];

    fixture.ingested.fail_next_reads(1);
    let executor = BatchExecutor::new(fixture.engine(), &config(1, 2)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &CancellationFlag::new());

    let decision = &report.decisions[0];
    assert_eq!(decision.failed_rules().count(), 0);
    assert_eq!(decision.score, 5);
    assert_eq!(fixture.ingested.reads(), 2);
    assert_eq!(fixture.ingested.transactions_begun(), 2);
    assert_eq!(fixture.ingested.open_transactions(), 0);
}

#[test]
fn test_retries_are_bounded() {
    let fixture = Fixture::new().with_account_rows();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(
        &scenario,
        Expression::True,
        vec![("Account active", frozen_account_rule(), 5)],
        10,
        30,
    );
    let payloads = vec![fixture.payload(transaction(10.0))];

    fixture.ingested.fail_next_reads(10);
    let executor = BatchExecutor::new(fixture.engine(), &config(1, 2)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &CancellationFlag::new());

    let decision = &report.decisions[0];
    assert_eq!(decision.rule_executions[0].error, Some(RuleExecutionError::DatabaseRead));
    assert_eq!(decision.score, 0);
    assert_eq!(fixture.ingested.reads(), 3);
}

#[test]
fn test_export_ndjson() {
    let fixture = Fixture::new();
    let scenario = fixture.create_scenario();
    let iteration = fixture.create_iteration(&scenario, Expression::True, vec![("Always", Expression::True, 15)], 10, 30);
    let payloads: Vec<Payload> = (0..3)
        .map(|n| fixture.payload(transaction_with_id(&format!("tx-{}", n), 10.0)))
        .collect();

    let executor = BatchExecutor::new(fixture.engine(), &config(2, 0)).unwrap();
    let report = executor.run(&fixture.data_model, &scenario, &iteration, &payloads, &CancellationFlag::new());

    let mut buffer = Vec::new();
    let written = export_ndjson(&report.decisions, &mut buffer).unwrap();
    assert_eq!(written, 3);

    let output = String::from_utf8(buffer).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, expected) in lines.iter().zip(&report.decisions) {
        let decision: Decision = serde_json::from_str(line).unwrap();
        assert_eq!(&decision, expected);
        assert_eq!(decision.outcome, Outcome::Review);
    }
}
