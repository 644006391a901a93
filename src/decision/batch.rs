use super::engine::{DecisionEngine, ScenarioEvaluation};
use super::Decision;
use crate::config::BatchConfig;
use crate::data::{DataModel, Payload};
use crate::error::{BatchError, ExportError, ScenarioEvaluationError};
use crate::scenario::{Scenario, ScenarioIteration};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Shared stop signal for a running batch. Checked before each object starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An object that could not be evaluated at all.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub error: ScenarioEvaluationError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub scheduled_execution_id: Uuid,
    /// Objects evaluated before the batch finished or was cancelled.
    pub processed: usize,
    /// Decisions in input order.
    pub decisions: Vec<Decision>,
    pub not_triggered: usize,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

/// Evaluates many objects against one iteration on a dedicated worker pool.
pub struct BatchExecutor<'a> {
    engine: DecisionEngine<'a>,
    pool: ThreadPool,
    max_db_retries: u32,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(engine: DecisionEngine<'a>, config: &BatchConfig) -> Result<Self, BatchError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.pool_size)
            .thread_name(|index| format!("risk-batch-{}", index))
            .build()?;
        Ok(Self {
            engine,
            pool,
            max_db_retries: config.max_db_retries,
        })
    }

    /// Runs every payload through `iteration`. Objects are independent: each gets its own
    /// accessor, and a failing object is reported without stopping the others.
    pub fn run(
        &self,
        data_model: &DataModel,
        scenario: &Scenario,
        iteration: &ScenarioIteration,
        payloads: &[Payload],
        cancellation: &CancellationFlag,
    ) -> BatchReport {
        let scheduled_execution_id = Uuid::new_v4();
        info!(
            %scheduled_execution_id,
            scenario_id = %scenario.id,
            objects = payloads.len(),
            workers = self.pool.current_num_threads(),
            "Starting batch execution"
        );

        let results: Vec<Option<Result<ScenarioEvaluation, ScenarioEvaluationError>>> = self.pool.install(|| {
            payloads
                .par_iter()
                .map(|payload| {
                    if cancellation.is_cancelled() {
                        return None;
                    }
                    Some(self.evaluate_with_retry(data_model, scenario, iteration, payload, scheduled_execution_id))
                })
                .collect()
        });

        let mut report = BatchReport {
            scheduled_execution_id,
            processed: 0,
            decisions: Vec::new(),
            not_triggered: 0,
            failures: Vec::new(),
            cancelled: cancellation.is_cancelled(),
        };
        for (index, result) in results.into_iter().enumerate() {
            let Some(result) = result else { continue };
            report.processed += 1;
            match result {
                Ok(ScenarioEvaluation::Triggered(decision)) => report.decisions.push(decision),
                Ok(ScenarioEvaluation::NotTriggered { .. }) => report.not_triggered += 1,
                Err(error) => report.failures.push(BatchFailure { index, error }),
            }
        }

        info!(
            %scheduled_execution_id,
            processed = report.processed,
            decisions = report.decisions.len(),
            not_triggered = report.not_triggered,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "Batch execution finished"
        );
        report
    }

    /// Database read failures are retried on the whole object, up to the configured bound.
    fn evaluate_with_retry(
        &self,
        data_model: &DataModel,
        scenario: &Scenario,
        iteration: &ScenarioIteration,
        payload: &Payload,
        scheduled_execution_id: Uuid,
    ) -> Result<ScenarioEvaluation, ScenarioEvaluationError> {
        let mut retries = 0;
        loop {
            let evaluation = self.engine.evaluate_with_data_model(
                data_model,
                scenario,
                iteration,
                payload,
                Some(scheduled_execution_id),
            )?;
            if !evaluation.has_db_read_error() || retries >= self.max_db_retries {
                return Ok(evaluation);
            }
            retries += 1;
            warn!(
                object_id = payload.object_id().unwrap_or("<none>"),
                retry = retries,
                "Database read failed, retrying object"
            );
        }
    }
}

/// Writes one JSON decision per line and returns the number of lines written.
pub fn export_ndjson<W: Write>(decisions: &[Decision], mut writer: W) -> Result<usize, ExportError> {
    for decision in decisions {
        serde_json::to_writer(&mut writer, decision)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(decisions.len())
}
