//! Common test fixtures: a small transactions/accounts/companies data model, in-memory
//! repositories, and formula builders.
#![allow(dead_code)]

use risk_engine::prelude::*;
use risk_engine::scenario::CreateRuleInput;
use serde_json::json;
use uuid::Uuid;

/// transactions -(account)-> accounts -(company)-> companies
pub fn create_data_model() -> DataModel {
    DataModel::new([
        Table::new("transactions")
            .with_field("object_id", DataType::String, false)
            .with_field("updated_at", DataType::Timestamp, true)
            .with_field("account_id", DataType::String, true)
            .with_field("amount", DataType::Float, true)
            .with_field("installments", DataType::Int, true)
            .with_field("currency", DataType::String, true)
            .with_field("is_flagged", DataType::Bool, true)
            .with_link("account", "accounts", "object_id", "account_id"),
        Table::new("accounts")
            .with_field("object_id", DataType::String, false)
            .with_field("company_id", DataType::String, true)
            .with_field("balance", DataType::Float, true)
            .with_field("is_frozen", DataType::Bool, true)
            .with_link("company", "companies", "object_id", "company_id"),
        Table::new("companies")
            .with_field("object_id", DataType::String, false)
            .with_field("name", DataType::String, true),
    ])
}

/// Everything a test needs to evaluate objects for one organization.
pub struct Fixture {
    pub org: Uuid,
    pub data_model: DataModel,
    pub data_models: InMemoryDataModelRepository,
    pub ingested: InMemoryIngestedData,
    pub scenarios: InMemoryScenarioRepository,
}

impl Fixture {
    pub fn new() -> Self {
        let org = Uuid::new_v4();
        let data_model = create_data_model();
        let data_models = InMemoryDataModelRepository::new();
        data_models.insert(org, data_model.clone()).unwrap();
        Self {
            org,
            data_model,
            data_models,
            ingested: InMemoryIngestedData::new(),
            scenarios: InMemoryScenarioRepository::new(),
        }
    }

    /// Account `acc-1` (balance 250, not frozen) owned by company `cmp-1` ("Acme").
    pub fn with_account_rows(self) -> Self {
        self.ingested
            .insert_row(
                self.org,
                "accounts",
                [
                    ("object_id", Value::from("acc-1")),
                    ("company_id", Value::from("cmp-1")),
                    ("balance", Value::Float(250.0)),
                    ("is_frozen", Value::Bool(false)),
                ],
            )
            .unwrap();
        self.ingested
            .insert_row(
                self.org,
                "companies",
                [("object_id", Value::from("cmp-1")), ("name", Value::from("Acme"))],
            )
            .unwrap();
        self
    }

    pub fn engine(&self) -> DecisionEngine<'_> {
        DecisionEngine::new(&self.data_models, &self.ingested)
    }

    pub fn payload(&self, raw: serde_json::Value) -> Payload {
        Payload::from_json(self.data_model.table("transactions").unwrap(), raw).unwrap()
    }

    pub fn accessor<'a>(&'a self, payload: &'a Payload) -> ScopedDataAccessor<'a> {
        ScopedDataAccessor::new(self.org, &self.data_model, payload, &self.ingested)
    }

    pub fn create_scenario(&self) -> Scenario {
        self.scenarios
            .create_scenario(CreateScenarioInput {
                organization_id: self.org,
                name: "Large transfers".to_string(),
                description: "Flags unusual transfers".to_string(),
                trigger_object_type: "transactions".to_string(),
            })
            .unwrap()
    }

    /// Creates a draft iteration with the given trigger, rules `(name, formula, score)`
    /// and thresholds.
    pub fn create_iteration(
        &self,
        scenario: &Scenario,
        trigger: Expression,
        rules: Vec<(&str, Expression, i64)>,
        review: i64,
        reject: i64,
    ) -> ScenarioIteration {
        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(index, (name, formula, score_modifier))| CreateRuleInput {
                display_order: index as u32,
                name: name.to_string(),
                description: String::new(),
                formula,
                score_modifier,
            })
            .collect();
        self.scenarios
            .create_iteration(
                scenario.id,
                CreateScenarioIterationInput {
                    trigger_condition: trigger,
                    rules,
                    score_review_threshold: review,
                    score_reject_threshold: reject,
                },
            )
            .unwrap()
    }

    pub fn publisher(&self) -> ScenarioPublisher<'_> {
        ScenarioPublisher::new(&self.scenarios, 3)
    }
}

/// A transaction paid from account `acc-1`.
pub fn transaction(amount: f64) -> serde_json::Value {
    json!({
        "object_id": "tx-1",
        "updated_at": "2024-05-01T10:00:00Z",
        "account_id": "acc-1",
        "amount": amount,
        "currency": "EUR",
        "is_flagged": false
    })
}

pub fn float(n: f64) -> Expression {
    Expression::FloatValue(n)
}

pub fn string(s: &str) -> Expression {
    Expression::StringValue(s.to_string())
}

pub fn string_list(items: &[&str]) -> Expression {
    Expression::StringListValue(items.iter().map(|item| item.to_string()).collect())
}

pub fn payload_float(name: &str) -> Expression {
    Expression::payload_field(FieldType::Float, name)
}

pub fn payload_string(name: &str) -> Expression {
    Expression::payload_field(FieldType::String, name)
}

pub fn payload_bool(name: &str) -> Expression {
    Expression::payload_field(FieldType::Bool, name)
}

pub fn gt(left: Expression, right: Expression) -> Expression {
    Expression::GreaterFloat(operand(left), operand(right))
}

pub fn lt(left: Expression, right: Expression) -> Expression {
    Expression::LesserFloat(operand(left), operand(right))
}

pub fn eq_float(left: Expression, right: Expression) -> Expression {
    Expression::EqualFloat(operand(left), operand(right))
}

pub fn eq_string(left: Expression, right: Expression) -> Expression {
    Expression::EqualString(operand(left), operand(right))
}

pub fn in_list(needle: Expression, list: Expression) -> Expression {
    Expression::StringIsInList(operand(needle), operand(list))
}
