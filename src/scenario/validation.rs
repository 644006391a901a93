use super::ScenarioIteration;
use crate::ast::{Expression, FieldRead, ValueType};
use crate::data::DataModel;
use itertools::Itertools;
use serde::Serialize;
use uuid::Uuid;

/// Problems found in one rule's formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidation {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub errors: Vec<String>,
}

/// Every problem found in an iteration, grouped by where it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioValidation {
    pub errors: Vec<String>,
    pub trigger_errors: Vec<String>,
    pub rule_errors: Vec<RuleValidation>,
}

impl ScenarioValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
            && self.trigger_errors.is_empty()
            && self.rule_errors.iter().all(|rule| rule.errors.is_empty())
    }

    /// All problems as flat, prefixed messages.
    pub fn problems(&self) -> Vec<String> {
        let trigger = self
            .trigger_errors
            .iter()
            .map(|error| format!("trigger condition: {}", error));
        let rules = self.rule_errors.iter().flat_map(|rule| {
            rule.errors
                .iter()
                .map(move |error| format!("rule '{}': {}", rule.rule_name, error))
        });
        self.errors.iter().cloned().chain(trigger).chain(rules).collect()
    }
}

/// Shape checks that need no data model: formulas are valid boolean trees and the
/// thresholds are ordered.
pub fn validate_structure(iteration: &ScenarioIteration) -> ScenarioValidation {
    validate(iteration, |_| Vec::new())
}

/// Shape checks plus resolution of every field read against `data_model`, starting
/// from `trigger_table`.
pub fn validate_iteration(
    iteration: &ScenarioIteration,
    data_model: &DataModel,
    trigger_table: &str,
) -> ScenarioValidation {
    let mut report = validate(iteration, |formula| {
        field_read_errors(formula, data_model, trigger_table)
    });
    if let Err(e) = data_model.table(trigger_table) {
        report.errors.push(e.to_string());
    }
    report
}

fn validate<F>(iteration: &ScenarioIteration, field_checks: F) -> ScenarioValidation
where
    F: Fn(&Expression) -> Vec<String>,
{
    let check_formula = |formula: &Expression| {
        let mut errors = formula_errors(formula);
        errors.extend(field_checks(formula));
        errors
    };

    let mut errors = Vec::new();
    if iteration.score_review_threshold > iteration.score_reject_threshold {
        errors.push(format!(
            "review threshold {} is above reject threshold {}",
            iteration.score_review_threshold, iteration.score_reject_threshold
        ));
    }
    if let Some(order) = iteration
        .rules
        .iter()
        .map(|rule| rule.display_order)
        .duplicates()
        .next()
    {
        errors.push(format!("display order {} is used by more than one rule", order));
    }

    ScenarioValidation {
        errors,
        trigger_errors: check_formula(&iteration.trigger_condition),
        rule_errors: iteration
            .ordered_rules()
            .into_iter()
            .map(|rule| RuleValidation {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                errors: check_formula(&rule.formula),
            })
            .collect(),
    }
}

fn formula_errors(formula: &Expression) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(e) = formula.validate() {
        errors.push(e.to_string());
    }
    if formula.return_type() != ValueType::Bool {
        errors.push(format!(
            "formula must return Bool, but {} returns {}",
            formula.discriminator(),
            formula.return_type()
        ));
    }
    errors
}

fn field_read_errors(formula: &Expression, data_model: &DataModel, trigger_table: &str) -> Vec<String> {
    let mut reads = Vec::new();
    formula.collect_field_reads(&mut reads);

    reads
        .into_iter()
        .filter_map(|read| {
            let (field, field_type) = match &read {
                FieldRead::Payload {
                    field_type,
                    field_name,
                } => (
                    data_model
                        .table(trigger_table)
                        .and_then(|table| table.field(field_name)),
                    *field_type,
                ),
                FieldRead::Db {
                    field_type,
                    path,
                    field_name,
                } => (
                    data_model.resolve_db_field(trigger_table, path, field_name),
                    *field_type,
                ),
            };
            match field {
                Err(e) => Some(format!("{}: {}", read, e)),
                Ok(field) if !field.data_type.accepts(field_type) => Some(format!(
                    "{} is read as {:?} but stored as {:?}",
                    read, field_type, field.data_type
                )),
                Ok(_) => None,
            }
        })
        .collect()
}
