//! Boundary to the racing engine.
//!
//! The engine is an external collaborator: it receives the rendered
//! parameter space, the scenario record and a callback it invokes once per
//! experiment, and answers with a table of elite configurations.

use crate::scenario::ScenarioRecord;
use rt_types::{AdapterError, CostRecord, EngineError, RawConfiguration, RawExperiment, RawValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Callback the engine invokes for each experiment. May be called from
/// several engine workers at once.
pub type ForeignRunner =
    Arc<dyn Fn(&RawExperiment) -> Result<CostRecord, AdapterError> + Send + Sync>;

/// Engine verbosity, forwarded explicitly with each request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EngineLogLevel {
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl EngineLogLevel {
    /// Whether a message at `level` passes this threshold.
    pub fn allows(self, level: EngineLogLevel) -> bool {
        level <= self
    }
}

/// Everything one engine invocation needs.
pub struct EngineRequest {
    /// Label of the run, for log attribution.
    pub run: String,
    /// The parameter space in the engine's text grammar.
    pub parameters: String,
    pub scenario: ScenarioRecord,
    pub target_runner: ForeignRunner,
    pub log_level: EngineLogLevel,
}

impl EngineRequest {
    /// Evaluates one experiment through the target runner callback.
    pub fn evaluate(&self, experiment: &RawExperiment) -> Result<CostRecord, AdapterError> {
        (self.target_runner)(experiment)
    }

    /// Forwards an engine diagnostic into tracing, filtered by the request's
    /// log level.
    pub fn engine_log(&self, level: EngineLogLevel, message: &str) {
        if !self.log_level.allows(level) {
            return;
        }
        match level {
            EngineLogLevel::Error => error!(target: "racetune::engine", run = %self.run, "{}", message),
            EngineLogLevel::Warning => warn!(target: "racetune::engine", run = %self.run, "{}", message),
            EngineLogLevel::Info => info!(target: "racetune::engine", run = %self.run, "{}", message),
            EngineLogLevel::Debug => debug!(target: "racetune::engine", run = %self.run, "{}", message),
        }
    }
}

impl fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRequest")
            .field("run", &self.run)
            .field("parameters", &self.parameters)
            .field("scenario", &self.scenario)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

/// A racing engine implementation.
pub trait RacingEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Runs one race to completion and returns the elite configurations,
    /// best first.
    fn race(&self, request: &EngineRequest) -> Result<ResultTable, EngineError>;
}

/// Whether a result column carries engine metadata rather than a parameter.
pub fn is_metadata_column(name: &str) -> bool {
    name.starts_with('.')
}

/// Tabular engine output: one row per elite configuration, with parameter
/// columns plus metadata columns such as `.ID.` and `.PARENT.`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl ResultTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<RawValue>) -> Result<(), EngineError> {
        if row.len() != self.columns.len() {
            return Err(EngineError::MalformedResult {
                message: format!(
                    "row {} has {} values for {} columns",
                    self.rows.len(),
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column-keyed records, in row order.
    pub fn records(&self) -> impl Iterator<Item = RawConfiguration> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
    }
}
