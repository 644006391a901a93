use super::{IterationState, ScenarioIteration, validation};
use crate::error::{PublicationError, RepositoryError};
use crate::repository::{PublicationCommit, ScenarioRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationAction {
    Publish,
    Unpublish,
}

impl PublicationAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for PublicationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationAction {
    type Err = PublicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(Self::Publish),
            "unpublish" => Ok(Self::Unpublish),
            _ => Err(PublicationError::BadParameter(format!(
                "unknown publication action '{}'",
                s
            ))),
        }
    }
}

/// One entry of a scenario's append-only publication log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioPublication {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub scenario_id: Uuid,
    pub scenario_iteration_id: Uuid,
    pub publication_action: PublicationAction,
    pub rank: u32,
    pub created_at: DateTime<Utc>,
}

/// A publish/unpublish request as received from an API layer. The action stays a raw
/// string so that unknown actions surface as `BadParameter` instead of a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationActionInput {
    pub scenario_iteration_id: Uuid,
    pub publication_action: String,
}

/// Drives the iteration state machine. Every change is committed through the repository's
/// compare-and-swap on `(live pointer, last rank)` plus the `updated_at` of each iteration
/// it validated, and retried on conflict.
pub struct ScenarioPublisher<'a> {
    repository: &'a dyn ScenarioRepository,
    max_retries: u32,
}

impl<'a> ScenarioPublisher<'a> {
    pub fn new(repository: &'a dyn ScenarioRepository, max_retries: u32) -> Self {
        Self {
            repository,
            max_retries,
        }
    }

    /// Executes an API publication request.
    ///
    /// `unpublish` targets the scenario of the given iteration and requires that iteration
    /// to be the live one, unless nothing is live at all.
    pub fn apply(&self, input: &PublicationActionInput) -> Result<Vec<ScenarioPublication>, PublicationError> {
        let action: PublicationAction = input.publication_action.parse()?;
        match action {
            PublicationAction::Publish => self.publish(input.scenario_iteration_id),
            PublicationAction::Unpublish => {
                let iteration = self.repository.get_iteration(input.scenario_iteration_id)?;
                let scenario = self.repository.get_scenario(iteration.scenario_id)?;
                match scenario.live_iteration_id {
                    Some(live) if live != iteration.id => Err(PublicationError::BadParameter(format!(
                        "iteration '{}' is not the live iteration of scenario '{}'",
                        iteration.id, scenario.id
                    ))),
                    _ => self.unpublish(scenario.id),
                }
            }
        }
    }

    /// Makes `iteration_id` the live iteration of its scenario. Returns the appended
    /// publication, or nothing when the iteration is already live.
    pub fn publish(&self, iteration_id: Uuid) -> Result<Vec<ScenarioPublication>, PublicationError> {
        let iteration = self.repository.get_iteration(iteration_id)?;
        let scenario_id = iteration.scenario_id;
        self.with_retries(scenario_id, || self.try_publish(iteration_id))
    }

    /// Clears the live iteration of `scenario_id`. A scenario with nothing live is left
    /// untouched and no publication is recorded.
    pub fn unpublish(&self, scenario_id: Uuid) -> Result<Vec<ScenarioPublication>, PublicationError> {
        self.with_retries(scenario_id, || self.try_unpublish(scenario_id))
    }

    fn try_publish(&self, iteration_id: Uuid) -> Result<Vec<ScenarioPublication>, PublicationError> {
        let iteration = self.repository.get_iteration(iteration_id)?;
        let scenario = self.repository.get_scenario(iteration.scenario_id)?;

        if scenario.live_iteration_id == Some(iteration.id) {
            return Ok(Vec::new());
        }

        check_publishable(&iteration)?;
        iteration.state.validate_transition(IterationState::Live)?;

        let mut transitions = Vec::with_capacity(2);
        let mut expected_iterations = Vec::with_capacity(2);
        if let Some(previous_id) = scenario.live_iteration_id {
            let previous = self.repository.get_iteration(previous_id)?;
            previous
                .state
                .validate_transition(IterationState::Superseded)?;
            transitions.push((previous_id, IterationState::Superseded));
            expected_iterations.push((previous_id, previous.updated_at));
        }
        transitions.push((iteration.id, IterationState::Live));
        expected_iterations.push((iteration.id, iteration.updated_at));

        let last_rank = self.last_rank(scenario.id)?;
        let publication = ScenarioPublication {
            id: Uuid::new_v4(),
            organization_id: scenario.organization_id,
            scenario_id: scenario.id,
            scenario_iteration_id: iteration.id,
            publication_action: PublicationAction::Publish,
            rank: last_rank + 1,
            created_at: Utc::now(),
        };

        self.repository.commit_publication(PublicationCommit {
            scenario_id: scenario.id,
            expected_live: scenario.live_iteration_id,
            expected_last_rank: last_rank,
            expected_iterations,
            new_live: Some(iteration.id),
            transitions,
            publication: publication.clone(),
        })?;

        info!(
            scenario_id = %scenario.id,
            iteration_id = %iteration.id,
            version = iteration.version,
            rank = publication.rank,
            "Published scenario iteration"
        );
        Ok(vec![publication])
    }

    fn try_unpublish(&self, scenario_id: Uuid) -> Result<Vec<ScenarioPublication>, PublicationError> {
        let scenario = self.repository.get_scenario(scenario_id)?;
        let Some(live_id) = scenario.live_iteration_id else {
            return Ok(Vec::new());
        };

        let live = self.repository.get_iteration(live_id)?;
        live.state
            .validate_transition(IterationState::Unpublished)?;

        let last_rank = self.last_rank(scenario.id)?;
        let publication = ScenarioPublication {
            id: Uuid::new_v4(),
            organization_id: scenario.organization_id,
            scenario_id: scenario.id,
            scenario_iteration_id: live_id,
            publication_action: PublicationAction::Unpublish,
            rank: last_rank + 1,
            created_at: Utc::now(),
        };

        self.repository.commit_publication(PublicationCommit {
            scenario_id: scenario.id,
            expected_live: Some(live_id),
            expected_last_rank: last_rank,
            expected_iterations: vec![(live_id, live.updated_at)],
            new_live: None,
            transitions: vec![(live_id, IterationState::Unpublished)],
            publication: publication.clone(),
        })?;

        info!(
            scenario_id = %scenario.id,
            iteration_id = %live_id,
            rank = publication.rank,
            "Unpublished scenario iteration"
        );
        Ok(vec![publication])
    }

    fn last_rank(&self, scenario_id: Uuid) -> Result<u32, RepositoryError> {
        Ok(self
            .repository
            .list_publications(scenario_id)?
            .iter()
            .map(|publication| publication.rank)
            .max()
            .unwrap_or(0))
    }

    fn with_retries<F>(&self, scenario_id: Uuid, mut attempt: F) -> Result<Vec<ScenarioPublication>, PublicationError>
    where
        F: FnMut() -> Result<Vec<ScenarioPublication>, PublicationError>,
    {
        let attempts = self.max_retries + 1;
        for n in 1..=attempts {
            match attempt() {
                Err(PublicationError::Repository(RepositoryError::Conflict(_))) => {
                    warn!(%scenario_id, attempt = n, "Publication conflicted with a concurrent change, retrying");
                }
                other => return other,
            }
        }
        Err(PublicationError::PublicationConflict {
            scenario_id,
            attempts,
        })
    }
}

fn check_publishable(iteration: &ScenarioIteration) -> Result<(), PublicationError> {
    let report = validation::validate_structure(iteration);
    if report.is_valid() {
        Ok(())
    } else {
        Err(PublicationError::BadParameter(format!(
            "iteration '{}' cannot be published: {}",
            iteration.id,
            report.problems().join("; ")
        )))
    }
}
