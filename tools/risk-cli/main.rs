use clap::{Parser, Subcommand};
use risk_engine::data::Payload;
use risk_engine::decision::export_ndjson;
use risk_engine::evaluator;
use risk_engine::prelude::*;
use risk_engine::scenario::validate_iteration;
use risk_engine::telemetry;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::time::Instant;
use uuid::Uuid;

/// A scenario definition file: the scenario header plus the iteration to publish.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScenario {
    name: String,
    #[serde(default)]
    description: String,
    trigger_object_type: String,
    iteration: CreateScenarioIterationInput,
}

/// Evaluate risk-scoring formulas and scenarios from JSON files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, validate and pretty-print a formula
    Check {
        /// Path to the formula JSON file
        formula_path: String,
    },
    /// Evaluate one object against a scenario and print the decision
    Evaluate {
        #[arg(long)]
        data_model: String,
        #[arg(long)]
        scenario: String,
        #[arg(long)]
        payload: String,
        /// Optional JSON file of ingested rows, keyed by table name
        #[arg(long)]
        rows: Option<String>,
        /// Print a one-line explanation of the trigger condition and every rule
        #[arg(long)]
        explain: bool,
    },
    /// Evaluate newline-delimited objects on the batch worker pool
    Batch {
        #[arg(long)]
        data_model: String,
        #[arg(long)]
        scenario: String,
        /// Path to a file with one JSON object per line
        #[arg(long)]
        payloads: String,
        #[arg(long)]
        rows: Option<String>,
        /// Write decisions here instead of stdout
        #[arg(long)]
        out: Option<String>,
    },
}

/// In-memory wiring for one CLI run.
struct Workspace {
    organization_id: Uuid,
    data_model: DataModel,
    data_models: InMemoryDataModelRepository,
    ingested: InMemoryIngestedData,
    scenarios: InMemoryScenarioRepository,
    scenario: Scenario,
    iteration: ScenarioIteration,
}

fn main() {
    let cli = Cli::parse();
    let config = EngineConfig::load().unwrap_or_else(|e| exit_with_error(&format!("Invalid configuration: {}", e)));
    if let Err(e) = telemetry::init(&config.telemetry) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match cli.command {
        Command::Check { formula_path } => run_check(&formula_path),
        Command::Evaluate {
            data_model,
            scenario,
            payload,
            rows,
            explain,
        } => run_evaluate(&config, &data_model, &scenario, &payload, rows.as_deref(), explain),
        Command::Batch {
            data_model,
            scenario,
            payloads,
            rows,
            out,
        } => run_batch(&config, &data_model, &scenario, &payloads, rows.as_deref(), out.as_deref()),
    }
}

fn run_check(formula_path: &str) {
    let json = read_file(formula_path);
    let formula = Expression::from_json_str(&json)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse formula: {}", e)));

    println!("{}", formula);
    println!("Returns: {}", formula.return_type());
    match formula.validate() {
        Ok(()) => println!("Formula is valid."),
        Err(e) => exit_with_error(&format!("Formula is invalid: {}", e)),
    }
}

fn run_evaluate(
    config: &EngineConfig,
    data_model_path: &str,
    scenario_path: &str,
    payload_path: &str,
    rows_path: Option<&str>,
    explain: bool,
) {
    let workspace = load_workspace(config, data_model_path, scenario_path, rows_path);
    let engine = DecisionEngine::new(&workspace.data_models, &workspace.ingested);

    let raw: serde_json::Value = serde_json::from_str(&read_file(payload_path))
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse payload JSON: {}", e)));
    let payload = engine
        .payload_from_json(workspace.organization_id, &workspace.scenario.trigger_object_type, raw)
        .unwrap_or_else(|e| exit_with_error(&format!("Invalid payload: {}", e)));

    if explain {
        print_explanations(&workspace, &payload);
    }

    let eval_start = Instant::now();
    let evaluation = engine
        .evaluate_live_scenario(&workspace.scenarios, workspace.scenario.id, &payload)
        .unwrap_or_else(|e| exit_with_error(&format!("Evaluation failed: {}", e)));
    let eval_duration = eval_start.elapsed();

    match evaluation {
        ScenarioEvaluation::Triggered(decision) => {
            let json = serde_json::to_string_pretty(&decision)
                .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode decision: {}", e)));
            println!("{}", json);
        }
        ScenarioEvaluation::NotTriggered { reason } => {
            println!("Scenario not triggered: {:?}", reason);
        }
    }
    eprintln!("Evaluation: {:?}", eval_duration);
}

fn print_explanations(workspace: &Workspace, payload: &Payload) {
    let accessor = ScopedDataAccessor::new(
        workspace.organization_id,
        &workspace.data_model,
        payload,
        &workspace.ingested,
    );
    let explain = |formula: &Expression| match evaluator::explain(formula, &accessor) {
        Ok(line) => line,
        Err(e) => format!("error: {}", e),
    };

    println!("Trigger: {}", explain(&workspace.iteration.trigger_condition));
    for rule in workspace.iteration.ordered_rules() {
        println!("Rule '{}' ({:+}): {}", rule.name, rule.score_modifier, explain(&rule.formula));
    }
    println!();
}

fn run_batch(
    config: &EngineConfig,
    data_model_path: &str,
    scenario_path: &str,
    payloads_path: &str,
    rows_path: Option<&str>,
    out_path: Option<&str>,
) {
    let workspace = load_workspace(config, data_model_path, scenario_path, rows_path);
    let engine = DecisionEngine::new(&workspace.data_models, &workspace.ingested);

    let payloads: Vec<Payload> = read_file(payloads_path)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            let raw: serde_json::Value = serde_json::from_str(line).unwrap_or_else(|e| {
                exit_with_error(&format!("Line {} is not valid JSON: {}", index + 1, e))
            });
            engine
                .payload_from_json(workspace.organization_id, &workspace.scenario.trigger_object_type, raw)
                .unwrap_or_else(|e| exit_with_error(&format!("Line {} is not a valid payload: {}", index + 1, e)))
        })
        .collect();

    let executor = BatchExecutor::new(engine, &config.batch)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to start batch: {}", e)));
    let batch_start = Instant::now();
    let report = executor.run(
        &workspace.data_model,
        &workspace.scenario,
        &workspace.iteration,
        &payloads,
        &CancellationFlag::new(),
    );
    let batch_duration = batch_start.elapsed();

    let written = match out_path {
        Some(path) => {
            let file = File::create(path)
                .unwrap_or_else(|e| exit_with_error(&format!("Failed to create '{}': {}", path, e)));
            export_ndjson(&report.decisions, BufWriter::new(file))
        }
        None => export_ndjson(&report.decisions, io::stdout().lock()),
    }
    .unwrap_or_else(|e| exit_with_error(&format!("Failed to export decisions: {}", e)));

    eprintln!("\n--- Batch Summary ---");
    eprintln!("Objects:        {}", payloads.len());
    eprintln!("Processed:      {}", report.processed);
    eprintln!("Decisions:      {}", written);
    eprintln!("Not triggered:  {}", report.not_triggered);
    eprintln!("Failures:       {}", report.failures.len());
    for failure in &report.failures {
        eprintln!("  line {}: {}", failure.index + 1, failure.error);
    }
    eprintln!("Duration:       {:?}", batch_duration);
    eprintln!("Workers:        {}", config.batch.pool_size);
    let _ = io::stderr().flush();
}

fn load_workspace(
    config: &EngineConfig,
    data_model_path: &str,
    scenario_path: &str,
    rows_path: Option<&str>,
) -> Workspace {
    let organization_id = Uuid::new_v4();

    let data_model = DataModel::from_file(data_model_path)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to load data model '{}': {}", data_model_path, e)));
    data_model
        .validate()
        .unwrap_or_else(|e| exit_with_error(&format!("Invalid data model: {}", e)));

    let raw_scenario: RawScenario = serde_json::from_str(&read_file(scenario_path))
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse scenario JSON: {}", e)));

    let data_models = InMemoryDataModelRepository::new();
    data_models
        .insert(organization_id, data_model.clone())
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));

    let ingested = InMemoryIngestedData::new();
    if let Some(rows_path) = rows_path {
        load_rows(&ingested, organization_id, &data_model, rows_path);
    }

    let scenarios = InMemoryScenarioRepository::new();
    let scenario = scenarios
        .create_scenario(CreateScenarioInput {
            organization_id,
            name: raw_scenario.name,
            description: raw_scenario.description,
            trigger_object_type: raw_scenario.trigger_object_type,
        })
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));
    let iteration = scenarios
        .create_iteration(scenario.id, raw_scenario.iteration)
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));

    let validation = validate_iteration(&iteration, &data_model, &scenario.trigger_object_type);
    if !validation.is_valid() {
        exit_with_error(&format!("Scenario is invalid:\n  {}", validation.problems().join("\n  ")));
    }

    ScenarioPublisher::new(&scenarios, config.publication.max_retries)
        .publish(iteration.id)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to publish scenario: {}", e)));
    let scenario = scenarios
        .get_scenario(scenario.id)
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));
    let iteration = scenarios
        .get_iteration(iteration.id)
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));

    Workspace {
        organization_id,
        data_model,
        data_models,
        ingested,
        scenarios,
        scenario,
        iteration,
    }
}

fn load_rows(ingested: &InMemoryIngestedData, organization_id: Uuid, data_model: &DataModel, rows_path: &str) {
    let tables: BTreeMap<String, Vec<serde_json::Value>> = serde_json::from_str(&read_file(rows_path))
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse rows JSON: {}", e)));

    for (table_name, rows) in tables {
        let table = data_model
            .table(&table_name)
            .unwrap_or_else(|e| exit_with_error(&e.to_string()));
        for raw in rows {
            let row = Payload::from_json(table, raw)
                .unwrap_or_else(|e| exit_with_error(&format!("Invalid row: {}", e)));
            ingested
                .insert_row(
                    organization_id,
                    &table_name,
                    row.fields.iter().map(|(name, value)| (name.as_str(), value.clone())),
                )
                .unwrap_or_else(|e| exit_with_error(&e.to_string()));
        }
    }
}

fn read_file(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| exit_with_error(&format!("Failed to read file '{}': {}", path, e)))
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
