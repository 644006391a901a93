//! # risk-engine - Rule Evaluation and Scenario Publication Engine
//!
//! **risk-engine** scores business objects (transactions, accounts, ...) against
//! versioned, organization-owned rule sets called *scenarios*, and produces an
//! approve/review/reject [`Decision`](decision::Decision) with an auditable score breakdown.
//!
//! ## Core Workflow
//!
//! 1.  **Describe the data**: a [`DataModel`](data::DataModel) lists the organization's
//!     tables, their typed fields, and the links between them.
//! 2.  **Write formulas**: trigger conditions and rules are typed [`Expression`](ast::Expression)
//!     trees. They serialize to the `{type, staticData, children}` record format and back.
//! 3.  **Publish**: a [`ScenarioPublisher`](scenario::ScenarioPublisher) makes one iteration
//!     of a scenario live, recording every change in an append-only publication log.
//! 4.  **Decide**: the [`DecisionEngine`](decision::DecisionEngine) evaluates the trigger
//!     condition, scores every rule, and snapshots the result. Database fields are read
//!     lazily through a [`DataAccessor`](accessor::DataAccessor).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use risk_engine::prelude::*;
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let org = uuid::Uuid::new_v4();
//!     let data_models = InMemoryDataModelRepository::new();
//!     data_models.insert(org, DataModel::new([Table::new("transactions")
//!         .with_field("object_id", DataType::String, false)
//!         .with_field("amount", DataType::Float, true)]))?;
//!     let ingested = InMemoryIngestedData::new();
//!     let scenarios = InMemoryScenarioRepository::new();
//!
//!     let scenario = scenarios.create_scenario(CreateScenarioInput {
//!         organization_id: org,
//!         name: "Large transfers".to_string(),
//!         description: String::new(),
//!         trigger_object_type: "transactions".to_string(),
//!     })?;
//!     let iteration = scenarios.create_iteration(scenario.id, serde_json::from_value(json!({
//!         "triggerCondition": {"type": "TRUE"},
//!         "rules": [{
//!             "name": "Amount above 1000",
//!             "scoreModifier": 20,
//!             "formula": {"type": "GREATER_FLOAT", "children": [
//!                 {"type": "PAYLOAD_FIELD_FLOAT", "staticData": {"fieldName": "amount"}},
//!                 {"type": "FLOAT_VALUE", "staticData": {"value": 1000}}
//!             ]}
//!         }],
//!         "scoreReviewThreshold": 10,
//!         "scoreRejectThreshold": 30
//!     }))?)?;
//!     ScenarioPublisher::new(&scenarios, 3).publish(iteration.id)?;
//!
//!     let engine = DecisionEngine::new(&data_models, &ingested);
//!     let payload = engine.payload_from_json(org, "transactions", json!({"object_id": "t1", "amount": 1500.0}))?;
//!     if let ScenarioEvaluation::Triggered(decision) = engine.evaluate_live_scenario(&scenarios, scenario.id, &payload)? {
//!         println!("-> {} with score {}", decision.outcome, decision.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod accessor;
pub mod ast;
pub mod config;
pub mod data;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod prelude;
pub mod repository;
pub mod scenario;
pub mod telemetry;
pub mod trace;
