//! Storage contracts the engine consumes. Everything is scoped by organization.

pub mod memory;

use crate::ast::Value;
use crate::data::{DataModel, Payload, Table};
use crate::error::RepositoryError;
use crate::scenario::{
    CreateScenarioInput, CreateScenarioIterationInput, IterationState, Scenario,
    ScenarioIteration, ScenarioPublication, UpdateScenarioIterationInput,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-organization data model lookups.
pub trait DataModelRepository: Send + Sync {
    fn get_data_model(&self, organization_id: Uuid) -> Result<DataModel, RepositoryError>;

    fn lookup_table(&self, organization_id: Uuid, table_name: &str) -> Result<Table, RepositoryError> {
        self.get_data_model(organization_id)?
            .tables
            .remove(table_name)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "table",
                id: table_name.to_string(),
            })
    }
}

/// Everything a database field read needs to locate its row.
#[derive(Debug, Clone, Copy)]
pub struct DbFieldReadParams<'a> {
    pub data_model: &'a DataModel,
    pub trigger_table: &'a str,
    pub payload: &'a Payload,
    pub path: &'a [String],
    pub field_name: &'a str,
}

/// Opens read-scoped transactions on an organization's ingested data.
pub trait IngestedDataReader: Send + Sync {
    fn begin_read<'a>(&'a self, organization_id: Uuid) -> Result<Box<dyn ReadTransaction + 'a>, RepositoryError>;
}

/// A read transaction. Dropping it releases it.
pub trait ReadTransaction {
    /// Follows `params.path` from the payload and reads the final field. `Ok(None)` when
    /// a linked row or the value itself is absent.
    fn read_db_field(&self, params: &DbFieldReadParams<'_>) -> Result<Option<Value>, RepositoryError>;
}

/// The swap applied by [`ScenarioRepository::commit_publication`]. The repository applies
/// all of it or none of it, and only if the scenario's live pointer still equals
/// `expected_live`, its last publication rank still equals `expected_last_rank`, and every
/// iteration in `expected_iterations` still carries the listed `updated_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationCommit {
    pub scenario_id: Uuid,
    pub expected_live: Option<Uuid>,
    pub expected_last_rank: u32,
    /// Iterations as they were read and validated.
    pub expected_iterations: Vec<(Uuid, DateTime<Utc>)>,
    pub new_live: Option<Uuid>,
    pub transitions: Vec<(Uuid, IterationState)>,
    pub publication: ScenarioPublication,
}

/// Scenario, iteration and publication storage.
pub trait ScenarioRepository: Send + Sync {
    fn get_scenario(&self, scenario_id: Uuid) -> Result<Scenario, RepositoryError>;

    fn create_scenario(&self, input: CreateScenarioInput) -> Result<Scenario, RepositoryError>;

    fn get_iteration(&self, iteration_id: Uuid) -> Result<ScenarioIteration, RepositoryError>;

    /// Iterations of a scenario, ordered by version.
    fn list_iterations(&self, scenario_id: Uuid) -> Result<Vec<ScenarioIteration>, RepositoryError>;

    /// Creates a `draft` iteration with the next version number of the scenario.
    fn create_iteration(
        &self,
        scenario_id: Uuid,
        input: CreateScenarioIterationInput,
    ) -> Result<ScenarioIteration, RepositoryError>;

    /// Edits a draft. Fails with `IterationImmutable` once the iteration has been live.
    fn update_iteration(
        &self,
        iteration_id: Uuid,
        input: UpdateScenarioIterationInput,
    ) -> Result<ScenarioIteration, RepositoryError>;

    /// Publications of a scenario, ordered by rank.
    fn list_publications(&self, scenario_id: Uuid) -> Result<Vec<ScenarioPublication>, RepositoryError>;

    fn get_publication(&self, publication_id: Uuid) -> Result<ScenarioPublication, RepositoryError>;

    /// Atomically applies a publication. Returns `Conflict` when the expected state no
    /// longer holds.
    fn commit_publication(&self, commit: PublicationCommit) -> Result<(), RepositoryError>;
}
