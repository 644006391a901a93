use super::{ClientObject, Decision, DecisionError, Outcome, RuleExecution, RuleExecutionError};
use crate::accessor::ScopedDataAccessor;
use crate::data::{DataModel, Payload};
use crate::error::{EvaluationError, ScenarioEvaluationError};
use crate::evaluator;
use crate::repository::{DataModelRepository, IngestedDataReader, ScenarioRepository};
use crate::scenario::{Scenario, ScenarioIteration};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum NotTriggeredReason {
    /// The trigger condition evaluated to `false`.
    ConditionFalse,
    /// The trigger condition could not be evaluated.
    ConditionFailed(EvaluationError),
}

/// Result of running one object through one scenario iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioEvaluation {
    NotTriggered { reason: NotTriggeredReason },
    Triggered(Decision),
}

impl ScenarioEvaluation {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            ScenarioEvaluation::Triggered(decision) => Some(decision),
            ScenarioEvaluation::NotTriggered { .. } => None,
        }
    }

    pub fn into_decision(self) -> Option<Decision> {
        match self {
            ScenarioEvaluation::Triggered(decision) => Some(decision),
            ScenarioEvaluation::NotTriggered { .. } => None,
        }
    }

    /// Whether a database read failed anywhere during the evaluation.
    pub fn has_db_read_error(&self) -> bool {
        match self {
            ScenarioEvaluation::NotTriggered {
                reason: NotTriggeredReason::ConditionFailed(EvaluationError::DbReadError(_)),
            } => true,
            ScenarioEvaluation::NotTriggered { .. } => false,
            ScenarioEvaluation::Triggered(decision) => decision
                .failed_rules()
                .any(|execution| execution.error == Some(RuleExecutionError::DatabaseRead)),
        }
    }
}

/// Evaluates objects against scenario iterations, reading database fields through
/// `ingested_data`.
#[derive(Clone, Copy)]
pub struct DecisionEngine<'a> {
    data_models: &'a dyn DataModelRepository,
    ingested_data: &'a dyn IngestedDataReader,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(data_models: &'a dyn DataModelRepository, ingested_data: &'a dyn IngestedDataReader) -> Self {
        Self {
            data_models,
            ingested_data,
        }
    }

    /// Parses a raw object against the organization's `table_name`.
    pub fn payload_from_json(
        &self,
        organization_id: Uuid,
        table_name: &str,
        raw: serde_json::Value,
    ) -> Result<Payload, ScenarioEvaluationError> {
        let table = self.data_models.lookup_table(organization_id, table_name)?;
        Ok(Payload::from_json(&table, raw)?)
    }

    /// Evaluates the scenario's current live iteration.
    pub fn evaluate_live_scenario(
        &self,
        scenarios: &dyn ScenarioRepository,
        scenario_id: Uuid,
        payload: &Payload,
    ) -> Result<ScenarioEvaluation, ScenarioEvaluationError> {
        let scenario = scenarios.get_scenario(scenario_id)?;
        let live_id = scenario
            .live_iteration_id
            .ok_or(ScenarioEvaluationError::NoLiveIteration(scenario_id))?;
        let iteration = scenarios.get_iteration(live_id)?;
        self.evaluate_iteration(&scenario, &iteration, payload, None)
    }

    /// Evaluates `payload` against `iteration`, loading the organization's data model.
    pub fn evaluate_iteration(
        &self,
        scenario: &Scenario,
        iteration: &ScenarioIteration,
        payload: &Payload,
        scheduled_execution_id: Option<Uuid>,
    ) -> Result<ScenarioEvaluation, ScenarioEvaluationError> {
        let data_model = self.data_models.get_data_model(scenario.organization_id)?;
        self.evaluate_with_data_model(&data_model, scenario, iteration, payload, scheduled_execution_id)
    }

    /// Evaluates with an already loaded data model. The read transaction, if any, is
    /// released before this returns.
    pub fn evaluate_with_data_model(
        &self,
        data_model: &DataModel,
        scenario: &Scenario,
        iteration: &ScenarioIteration,
        payload: &Payload,
        scheduled_execution_id: Option<Uuid>,
    ) -> Result<ScenarioEvaluation, ScenarioEvaluationError> {
        if payload.table_name != scenario.trigger_object_type {
            return Err(ScenarioEvaluationError::WrongTriggerTable {
                scenario_id: scenario.id,
                expected: scenario.trigger_object_type.clone(),
                found: payload.table_name.clone(),
            });
        }

        let accessor = ScopedDataAccessor::new(scenario.organization_id, data_model, payload, self.ingested_data);

        match evaluator::evaluate_bool(&iteration.trigger_condition, &accessor) {
            Ok(true) => {}
            Ok(false) => {
                debug!(scenario_id = %scenario.id, "Trigger condition is false");
                return Ok(ScenarioEvaluation::NotTriggered {
                    reason: NotTriggeredReason::ConditionFalse,
                });
            }
            Err(e) => {
                warn!(scenario_id = %scenario.id, error = %e, "Trigger condition failed");
                return Ok(ScenarioEvaluation::NotTriggered {
                    reason: NotTriggeredReason::ConditionFailed(e),
                });
            }
        }

        let rule_executions: Vec<RuleExecution> = iteration
            .ordered_rules()
            .into_iter()
            .map(|rule| {
                let execution = RuleExecution::from_result(rule, evaluator::evaluate_bool(&rule.formula, &accessor));
                match &execution.error_message {
                    Some(message) => warn!(rule = %rule.name, error = %message, "Rule evaluation failed"),
                    None => debug!(rule = %rule.name, result = execution.result, "Rule evaluated"),
                }
                execution
            })
            .collect();
        drop(accessor);

        // Saturates at the i64 bounds.
        let score = rule_executions
            .iter()
            .fold(0i64, |score, execution| score.saturating_add(execution.result_score_modifier));
        let outcome = Outcome::from_score(score, iteration.score_review_threshold, iteration.score_reject_threshold);
        let error_code = rule_executions
            .iter()
            .any(|execution| execution.error.is_some())
            .then_some(DecisionError::RuleExecutionFailed);

        let decision = Decision {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            organization_id: scenario.organization_id,
            client_object: ClientObject {
                table_name: payload.table_name.clone(),
                data: payload.raw.clone(),
            },
            scenario_id: scenario.id,
            scenario_iteration_id: iteration.id,
            scenario_name: scenario.name.clone(),
            scenario_description: scenario.description.clone(),
            scenario_version: iteration.version,
            score_review_threshold: iteration.score_review_threshold,
            score_reject_threshold: iteration.score_reject_threshold,
            score,
            outcome,
            rule_executions,
            error_code,
            scheduled_execution_id,
        };

        info!(
            decision_id = %decision.id,
            scenario_id = %scenario.id,
            version = iteration.version,
            score,
            outcome = %outcome,
            "Decision taken"
        );
        Ok(ScenarioEvaluation::Triggered(decision))
    }
}
