//! A single tuning run: render, invoke the engine, decode the elites.

use crate::adapter::{EvaluationAdapter, FnRunner, TargetRunner};
use crate::engine::{is_metadata_column, EngineLogLevel, EngineRequest, RacingEngine, ResultTable};
use crate::scenario::Scenario;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rt_space::{ParameterSpace, Repair};
use rt_types::{
    Configuration, Experiment, IntoCost, ParameterValue, RawConfiguration, RawValue, Scalar,
    ScenarioError, TuneError, TuneResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a run. Each state is entered when its stage starts;
/// `Failed` is reachable from every other state except `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Built,
    Rendered,
    Invoked,
    Decoded,
    Done,
    Failed,
}

impl RunState {
    /// What the run is doing in this state; used to attribute failures.
    pub fn activity(self) -> &'static str {
        match self {
            Self::Built => "building",
            Self::Rendered => "rendering inputs",
            Self::Invoked => "invoking engine",
            Self::Decoded => "decoding results",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Status record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: Uuid,
    pub name: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: RunState::Built,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn advance(&mut self, state: RunState) {
        debug_assert!(!self.state.is_terminal(), "run already finished");
        self.state = state;
        if state == RunState::Done {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Per-run options that are not part of the scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Keep engine metadata columns (`.ID.`, `.PARENT.`, ...) in results.
    pub keep_metadata: bool,
    pub log_level: EngineLogLevel,
}

/// An elite configuration returned by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunedConfiguration {
    pub parameters: Configuration,
    /// Engine metadata; empty unless requested.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, RawValue>,
}

/// Elite configurations of a run, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuningResult {
    configurations: Vec<TunedConfiguration>,
}

impl TuningResult {
    pub fn new(configurations: Vec<TunedConfiguration>) -> Self {
        Self { configurations }
    }

    pub fn configurations(&self) -> &[TunedConfiguration] {
        &self.configurations
    }

    pub fn best(&self) -> Option<&Configuration> {
        self.configurations.first().map(|c| &c.parameters)
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// The plain sequence of typed mappings.
    pub fn into_configurations(self) -> Vec<Configuration> {
        self.configurations
            .into_iter()
            .map(|c| c.parameters)
            .collect()
    }

    /// Tabular view: parameter columns in space order, then any metadata
    /// columns in first-seen order.
    pub fn to_table(&self, space: &ParameterSpace) -> ConfigurationTable {
        let mut metadata_columns: Vec<String> = Vec::new();
        for configuration in &self.configurations {
            for key in configuration.metadata.keys() {
                if !metadata_columns.contains(key) {
                    metadata_columns.push(key.clone());
                }
            }
        }

        let parameters: Vec<String> = space.names().map(str::to_string).collect();
        let rows = self
            .configurations
            .iter()
            .map(|configuration| {
                let mut row: Vec<Option<ParameterValue>> = parameters
                    .iter()
                    .map(|name| configuration.parameters.get(name).cloned().flatten())
                    .collect();
                row.extend(metadata_columns.iter().map(|name| {
                    configuration.metadata.get(name).and_then(metadata_cell)
                }));
                row
            })
            .collect();

        let mut columns = parameters;
        columns.extend(metadata_columns);
        ConfigurationTable { columns, rows }
    }
}

fn metadata_cell(value: &RawValue) -> Option<ParameterValue> {
    match value {
        RawValue::Null => None,
        RawValue::Bool(v) => Some(ParameterValue::Bool(*v)),
        RawValue::Int(v) => Some(ParameterValue::Integer(*v)),
        RawValue::Float(v) => Some(ParameterValue::Real(*v)),
        RawValue::Str(v) => Some(ParameterValue::Label(Scalar::Str(v.clone()))),
    }
}

/// Row-per-configuration table of a [`TuningResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<ParameterValue>>>,
}

impl ConfigurationTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&ParameterValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_ref()
    }
}

/// Converts the engine's result table into typed configurations.
pub fn decode_results(
    space: &ParameterSpace,
    table: &ResultTable,
    keep_metadata: bool,
) -> TuneResult<TuningResult> {
    let configurations = table
        .records()
        .map(|record| -> TuneResult<TunedConfiguration> {
            let (metadata, parameters): (RawConfiguration, RawConfiguration) = record
                .into_iter()
                .partition(|(column, _)| is_metadata_column(column));
            Ok(TunedConfiguration {
                parameters: parameters.repair(space)?,
                metadata: if keep_metadata {
                    metadata
                } else {
                    IndexMap::new()
                },
            })
        })
        .collect::<TuneResult<Vec<_>>>()?;
    Ok(TuningResult::new(configurations))
}

/// A parameter space, a scenario and a target runner, ready to execute.
pub struct Run<I = ()> {
    name: Option<String>,
    space: Arc<ParameterSpace>,
    scenario: Arc<Scenario<I>>,
    runner: Arc<dyn TargetRunner<I>>,
}

impl<I> Clone for Run<I> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            space: Arc::clone(&self.space),
            scenario: Arc::clone(&self.scenario),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<I> fmt::Debug for Run<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("name", &self.name)
            .field("parameters", &self.space.len())
            .field("scenario", &self.scenario)
            .finish_non_exhaustive()
    }
}

impl<I> Run<I> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn scenario(&self) -> &Scenario<I> {
        &self.scenario
    }

    /// Replaces the scenario seed.
    pub fn with_seed(mut self, seed: u64) -> Result<Self, ScenarioError> {
        self.scenario = Arc::new(self.scenario.with_seed(seed)?);
        Ok(self)
    }
}

impl<I: Send + Sync + 'static> Run<I> {
    /// Builds a run from a closure target runner.
    pub fn new<F, C>(space: ParameterSpace, scenario: Scenario<I>, target_runner: F) -> Self
    where
        F: Fn(&Experiment<'_, I>, &Scenario<I>) -> anyhow::Result<C> + Send + Sync + 'static,
        C: IntoCost + 'static,
    {
        Self::with_runner(space, scenario, Arc::new(FnRunner::new(target_runner)))
    }

    pub fn with_runner(
        space: ParameterSpace,
        scenario: Scenario<I>,
        runner: Arc<dyn TargetRunner<I>>,
    ) -> Self {
        Self {
            name: None,
            space: Arc::new(space),
            scenario: Arc::new(scenario),
            runner,
        }
    }

    /// Executes the run once, blocking until the engine returns.
    pub fn execute(&self, engine: &dyn RacingEngine, options: &RunOptions) -> TuneResult<RunReport> {
        let label = self.name.as_deref().unwrap_or("run");
        self.execute_as(label, engine, options)
    }

    pub(crate) fn execute_as(
        &self,
        label: &str,
        engine: &dyn RacingEngine,
        options: &RunOptions,
    ) -> TuneResult<RunReport> {
        let mut status = RunStatus::new(label);
        status.mark_running();
        info!(
            run = %label,
            engine = engine.name(),
            parameters = self.space.len(),
            seed = ?self.scenario.seed(),
            "starting tuning run"
        );

        let fail = |status: &mut RunStatus, source: TuneError| {
            let stage = status.state.activity().to_string();
            warn!(run = %label, stage = %stage, error = %source, "tuning run failed");
            status.mark_failed(source.to_string());
            TuneError::RunFailed {
                run: label.to_string(),
                stage,
                source: Box::new(source),
            }
        };

        status.advance(RunState::Rendered);
        let adapter = EvaluationAdapter::new(
            Arc::clone(&self.space),
            Arc::clone(&self.scenario),
            Arc::clone(&self.runner),
        );
        let request = EngineRequest {
            run: label.to_string(),
            parameters: self.space.render_space(),
            scenario: self.scenario.to_record(),
            target_runner: adapter.into_foreign(),
            log_level: options.log_level,
        };
        debug!(run = %label, parameters = %request.parameters, "rendered parameter space");

        status.advance(RunState::Invoked);
        let table = engine
            .race(&request)
            .map_err(|e| fail(&mut status, e.into()))?;
        debug!(run = %label, elites = table.len(), "engine returned");

        status.advance(RunState::Decoded);
        let result = decode_results(&self.space, &table, options.keep_metadata)
            .map_err(|e| fail(&mut status, e))?;

        status.advance(RunState::Done);
        info!(run = %label, elites = result.len(), "tuning run finished");
        Ok(RunReport { status, result })
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub result: TuningResult,
}

/// Runs a single tuning job and returns its elites.
pub fn tune<I, F, C>(
    engine: &dyn RacingEngine,
    space: ParameterSpace,
    scenario: Scenario<I>,
    target_runner: F,
    options: &RunOptions,
) -> TuneResult<TuningResult>
where
    I: Send + Sync + 'static,
    F: Fn(&Experiment<'_, I>, &Scenario<I>) -> anyhow::Result<C> + Send + Sync + 'static,
    C: IntoCost + 'static,
{
    let run = Run::new(space, scenario, target_runner);
    Ok(run.execute(engine, options)?.result)
}
