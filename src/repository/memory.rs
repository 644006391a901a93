//! In-memory repositories for tests, the CLI and embedding. Not durable.

use super::{
    DataModelRepository, DbFieldReadParams, IngestedDataReader, PublicationCommit, ReadTransaction,
    ScenarioRepository,
};
use crate::ast::Value;
use crate::data::DataModel;
use crate::error::RepositoryError;
use crate::scenario::{
    CreateScenarioInput, CreateScenarioIterationInput, IterationState, Scenario,
    ScenarioIteration, ScenarioPublication, UpdateScenarioIterationInput,
};
use ahash::AHashMap;
use chrono::{TimeDelta, Utc};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Storage("in-memory store lock poisoned".to_string()))
}

fn not_found(entity: &'static str, id: Uuid) -> RepositoryError {
    RepositoryError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDataModelRepository {
    models: Mutex<AHashMap<Uuid, DataModel>>,
}

impl InMemoryDataModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, organization_id: Uuid, data_model: DataModel) -> Result<(), RepositoryError> {
        lock(&self.models)?.insert(organization_id, data_model);
        Ok(())
    }
}

impl DataModelRepository for InMemoryDataModelRepository {
    fn get_data_model(&self, organization_id: Uuid) -> Result<DataModel, RepositoryError> {
        lock(&self.models)?
            .get(&organization_id)
            .cloned()
            .ok_or_else(|| not_found("data model", organization_id))
    }
}

type Row = AHashMap<String, Value>;

/// Ingested rows keyed by organization and table, with counters for the transactions and
/// reads issued against them.
#[derive(Debug, Default)]
pub struct InMemoryIngestedData {
    rows: Mutex<AHashMap<(Uuid, String), Vec<Row>>>,
    open_transactions: AtomicUsize,
    transactions_begun: AtomicUsize,
    reads: AtomicUsize,
    pending_failures: AtomicU32,
}

impl InMemoryIngestedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row<'k>(
        &self,
        organization_id: Uuid,
        table: &str,
        fields: impl IntoIterator<Item = (&'k str, Value)>,
    ) -> Result<(), RepositoryError> {
        let row = fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        lock(&self.rows)?
            .entry((organization_id, table.to_string()))
            .or_default()
            .push(row);
        Ok(())
    }

    /// Makes the next `count` field reads fail with a storage error.
    pub fn fail_next_reads(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::SeqCst)
    }

    pub fn transactions_begun(&self) -> usize {
        self.transactions_begun.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl IngestedDataReader for InMemoryIngestedData {
    fn begin_read<'a>(&'a self, organization_id: Uuid) -> Result<Box<dyn ReadTransaction + 'a>, RepositoryError> {
        self.transactions_begun.fetch_add(1, Ordering::SeqCst);
        self.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryReadTransaction {
            store: self,
            organization_id,
        }))
    }
}

struct InMemoryReadTransaction<'a> {
    store: &'a InMemoryIngestedData,
    organization_id: Uuid,
}

impl ReadTransaction for InMemoryReadTransaction<'_> {
    fn read_db_field(&self, params: &DbFieldReadParams<'_>) -> Result<Option<Value>, RepositoryError> {
        self.store.reads.fetch_add(1, Ordering::SeqCst);
        if self.store.take_failure() {
            return Err(RepositoryError::Storage("injected read failure".to_string()));
        }

        let rows = lock(&self.store.rows)?;
        let mut table = params
            .data_model
            .table(params.trigger_table)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let mut current: &Row = &params.payload.fields;

        for link_name in params.path {
            let link = table
                .link(link_name)
                .map_err(|e| RepositoryError::Storage(e.to_string()))?;
            let Some(key) = current.get(&link.child_field_name) else {
                return Ok(None);
            };
            let linked = rows
                .get(&(self.organization_id, link.linked_table_name.clone()))
                .and_then(|candidates| {
                    candidates
                        .iter()
                        .find(|row| row.get(&link.parent_field_name) == Some(key))
                });
            let Some(linked) = linked else {
                return Ok(None);
            };
            current = linked;
            table = params
                .data_model
                .table(&link.linked_table_name)
                .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        }

        Ok(current.get(params.field_name).cloned())
    }
}

impl Drop for InMemoryReadTransaction<'_> {
    fn drop(&mut self) {
        self.store.open_transactions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ScenarioStore {
    scenarios: AHashMap<Uuid, Scenario>,
    iterations: AHashMap<Uuid, ScenarioIteration>,
    publications: Vec<ScenarioPublication>,
}

/// Scenario storage behind one mutex; `commit_publication` checks and applies under the
/// same guard.
#[derive(Debug, Default)]
pub struct InMemoryScenarioRepository {
    store: Mutex<ScenarioStore>,
    injected_conflicts: AtomicU32,
}

impl InMemoryScenarioRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publication commits fail with `Conflict`.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }
}

impl ScenarioRepository for InMemoryScenarioRepository {
    fn get_scenario(&self, scenario_id: Uuid) -> Result<Scenario, RepositoryError> {
        lock(&self.store)?
            .scenarios
            .get(&scenario_id)
            .cloned()
            .ok_or_else(|| not_found("scenario", scenario_id))
    }

    fn create_scenario(&self, input: CreateScenarioInput) -> Result<Scenario, RepositoryError> {
        let scenario = Scenario {
            id: Uuid::new_v4(),
            organization_id: input.organization_id,
            name: input.name,
            description: input.description,
            trigger_object_type: input.trigger_object_type,
            live_iteration_id: None,
            created_at: Utc::now(),
        };
        lock(&self.store)?
            .scenarios
            .insert(scenario.id, scenario.clone());
        Ok(scenario)
    }

    fn get_iteration(&self, iteration_id: Uuid) -> Result<ScenarioIteration, RepositoryError> {
        lock(&self.store)?
            .iterations
            .get(&iteration_id)
            .cloned()
            .ok_or_else(|| not_found("scenario iteration", iteration_id))
    }

    fn list_iterations(&self, scenario_id: Uuid) -> Result<Vec<ScenarioIteration>, RepositoryError> {
        let store = lock(&self.store)?;
        let mut iterations: Vec<ScenarioIteration> = store
            .iterations
            .values()
            .filter(|iteration| iteration.scenario_id == scenario_id)
            .cloned()
            .collect();
        iterations.sort_by_key(|iteration| iteration.version);
        Ok(iterations)
    }

    fn create_iteration(
        &self,
        scenario_id: Uuid,
        input: CreateScenarioIterationInput,
    ) -> Result<ScenarioIteration, RepositoryError> {
        let mut store = lock(&self.store)?;
        if !store.scenarios.contains_key(&scenario_id) {
            return Err(not_found("scenario", scenario_id));
        }

        let version = store
            .iterations
            .values()
            .filter(|iteration| iteration.scenario_id == scenario_id)
            .map(|iteration| iteration.version)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now();
        let iteration = ScenarioIteration {
            id: Uuid::new_v4(),
            scenario_id,
            version,
            trigger_condition: input.trigger_condition,
            rules: input
                .rules
                .into_iter()
                .map(|rule| rule.into_rule(now))
                .collect(),
            score_review_threshold: input.score_review_threshold,
            score_reject_threshold: input.score_reject_threshold,
            state: IterationState::Draft,
            created_at: now,
            updated_at: now,
        };
        store.iterations.insert(iteration.id, iteration.clone());
        Ok(iteration)
    }

    fn update_iteration(
        &self,
        iteration_id: Uuid,
        input: UpdateScenarioIterationInput,
    ) -> Result<ScenarioIteration, RepositoryError> {
        let mut store = lock(&self.store)?;
        let iteration = store
            .iterations
            .get_mut(&iteration_id)
            .ok_or_else(|| not_found("scenario iteration", iteration_id))?;
        if !iteration.state.is_editable() {
            return Err(RepositoryError::IterationImmutable(iteration_id));
        }

        // Strictly increasing; commit_publication compares it.
        let now = Utc::now().max(iteration.updated_at + TimeDelta::nanoseconds(1));
        if let Some(trigger_condition) = input.trigger_condition {
            iteration.trigger_condition = trigger_condition;
        }
        if let Some(rules) = input.rules {
            iteration.rules = rules.into_iter().map(|rule| rule.into_rule(now)).collect();
        }
        if let Some(threshold) = input.score_review_threshold {
            iteration.score_review_threshold = threshold;
        }
        if let Some(threshold) = input.score_reject_threshold {
            iteration.score_reject_threshold = threshold;
        }
        iteration.updated_at = now;
        Ok(iteration.clone())
    }

    fn list_publications(&self, scenario_id: Uuid) -> Result<Vec<ScenarioPublication>, RepositoryError> {
        let store = lock(&self.store)?;
        let mut publications: Vec<ScenarioPublication> = store
            .publications
            .iter()
            .filter(|publication| publication.scenario_id == scenario_id)
            .cloned()
            .collect();
        publications.sort_by_key(|publication| publication.rank);
        Ok(publications)
    }

    fn get_publication(&self, publication_id: Uuid) -> Result<ScenarioPublication, RepositoryError> {
        lock(&self.store)?
            .publications
            .iter()
            .find(|publication| publication.id == publication_id)
            .cloned()
            .ok_or_else(|| not_found("scenario publication", publication_id))
    }

    fn commit_publication(&self, commit: PublicationCommit) -> Result<(), RepositoryError> {
        let mut store = lock(&self.store)?;

        if self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RepositoryError::Conflict(commit.scenario_id));
        }

        let scenario = store
            .scenarios
            .get(&commit.scenario_id)
            .ok_or_else(|| not_found("scenario", commit.scenario_id))?;
        let last_rank = store
            .publications
            .iter()
            .filter(|publication| publication.scenario_id == commit.scenario_id)
            .map(|publication| publication.rank)
            .max()
            .unwrap_or(0);
        if scenario.live_iteration_id != commit.expected_live || last_rank != commit.expected_last_rank {
            return Err(RepositoryError::Conflict(commit.scenario_id));
        }
        for (iteration_id, _) in &commit.transitions {
            match store.iterations.get(iteration_id) {
                Some(iteration) if iteration.scenario_id == commit.scenario_id => {}
                _ => return Err(not_found("scenario iteration", *iteration_id)),
            }
        }
        for (iteration_id, updated_at) in &commit.expected_iterations {
            match store.iterations.get(iteration_id) {
                Some(iteration) if iteration.updated_at == *updated_at => {}
                Some(_) => return Err(RepositoryError::Conflict(commit.scenario_id)),
                None => return Err(not_found("scenario iteration", *iteration_id)),
            }
        }

        // All checks passed; nothing below can fail.
        let now = Utc::now();
        for (iteration_id, state) in commit.transitions {
            if let Some(iteration) = store.iterations.get_mut(&iteration_id) {
                iteration.state = state;
                iteration.updated_at = now;
            }
        }
        if let Some(scenario) = store.scenarios.get_mut(&commit.scenario_id) {
            scenario.live_iteration_id = commit.new_live;
        }
        store.publications.push(commit.publication);
        Ok(())
    }
}
