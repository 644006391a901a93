//! Scenarios, their versioned iterations, and the publication state machine that decides
//! which iteration is live.

pub mod publication;
pub mod validation;

pub use publication::{
    PublicationAction, PublicationActionInput, ScenarioPublication, ScenarioPublisher,
};
pub use validation::{ScenarioValidation, validate_iteration};

use crate::ast::Expression;
use crate::error::PublicationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// An organization-owned rule set evaluated against objects of one trigger table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: String,
    pub trigger_object_type: String,
    pub live_iteration_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a scenario iteration relative to its scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationState {
    /// Created, never live. The only editable state.
    Draft,
    /// The scenario's current live iteration.
    Live,
    /// Was live, replaced by a newer publication.
    Superseded,
    /// Was live, removed with no replacement.
    Unpublished,
}

impl IterationState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Live => "live",
            Self::Superseded => "superseded",
            Self::Unpublished => "unpublished",
        }
    }

    /// Drafts are the only iterations that may still be edited.
    pub const fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Validates a move to `next`. Superseded and unpublished iterations may go live
    /// again (rollback); nothing returns to draft.
    pub fn validate_transition(&self, next: Self) -> Result<(), PublicationError> {
        let valid = match self {
            Self::Draft | Self::Superseded | Self::Unpublished => matches!(next, Self::Live),
            Self::Live => matches!(next, Self::Superseded | Self::Unpublished),
        };

        if valid {
            Ok(())
        } else {
            Err(PublicationError::InvalidStateTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IterationState {
    type Err = PublicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "live" => Ok(Self::Live),
            "superseded" => Ok(Self::Superseded),
            "unpublished" => Ok(Self::Unpublished),
            _ => Err(PublicationError::BadParameter(format!(
                "unknown iteration state '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Uuid,
    pub display_order: u32,
    pub name: String,
    pub description: String,
    pub formula: Expression,
    pub score_modifier: i64,
    pub created_at: DateTime<Utc>,
}

/// An immutable-once-published version of a scenario's trigger condition, rules and
/// thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioIteration {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub version: u32,
    pub trigger_condition: Expression,
    pub rules: Vec<Rule>,
    pub score_review_threshold: i64,
    pub score_reject_threshold: i64,
    pub state: IterationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScenarioIteration {
    /// Rules sorted by display order, the order they are scored in.
    pub fn ordered_rules(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|rule| rule.display_order);
        rules
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScenarioInput {
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_object_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleInput {
    #[serde(default)]
    pub display_order: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub formula: Expression,
    pub score_modifier: i64,
}

/// Body of a new iteration. The repository assigns id, version and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScenarioIterationInput {
    pub trigger_condition: Expression,
    #[serde(default)]
    pub rules: Vec<CreateRuleInput>,
    pub score_review_threshold: i64,
    pub score_reject_threshold: i64,
}

/// Partial update of a draft iteration. `None` leaves the field as is; `rules`
/// replaces the whole rule set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScenarioIterationInput {
    pub trigger_condition: Option<Expression>,
    pub rules: Option<Vec<CreateRuleInput>>,
    pub score_review_threshold: Option<i64>,
    pub score_reject_threshold: Option<i64>,
}

impl CreateRuleInput {
    pub fn into_rule(self, created_at: DateTime<Utc>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            display_order: self.display_order,
            name: self.name,
            description: self.description,
            formula: self.formula,
            score_modifier: self.score_modifier,
            created_at,
        }
    }
}
