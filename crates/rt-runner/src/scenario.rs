//! Run configuration handed to the racing engine.

use rt_space::quote;
use rt_types::{ScenarioError, TuneResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Largest seed the engine accepts.
pub const MAX_ENGINE_SEED: u64 = i32::MAX as u64;

/// What the execution environment can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Whether the engine may run evaluations in concurrent workers.
    pub parallel_workers: bool,
    /// Number of workers the host can run at once.
    pub available_workers: usize,
}

impl Platform {
    pub fn new(parallel_workers: bool, available_workers: usize) -> Self {
        Self {
            parallel_workers,
            available_workers: available_workers.max(1),
        }
    }

    /// Capabilities of the current host. The engine's worker processes are
    /// not available on Windows.
    pub fn detect() -> Self {
        let available = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(!cfg!(windows), available)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

/// Serializable scenario settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub max_experiments: Option<u64>,
    pub min_experiments: Option<u64>,
    pub elitist: bool,
    pub deterministic: bool,
    /// Workers the engine may use for evaluations.
    pub n_jobs: i32,
    pub seed: Option<u64>,
    /// Engine verbosity; `0` is quiet.
    pub verbose: u32,
    pub log_file: Option<PathBuf>,
    pub exec_dir: Option<PathBuf>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            max_experiments: None,
            min_experiments: None,
            elitist: true,
            deterministic: false,
            n_jobs: 1,
            seed: None,
            verbose: 0,
            log_file: None,
            exec_dir: None,
        }
    }
}

impl ScenarioConfig {
    pub fn from_json(text: &str) -> TuneResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self, platform: &Platform) -> Result<(), ScenarioError> {
        match (self.max_experiments, self.min_experiments) {
            (None, None) => return Err(ScenarioError::MissingBudget),
            (Some(_), Some(_)) => return Err(ScenarioError::ConflictingBudget),
            (Some(0), None) | (None, Some(0)) => {
                return Err(ScenarioError::InvalidBudget { value: 0 });
            }
            _ => {}
        }

        if self.n_jobs < 0 {
            return Err(ScenarioError::InvalidJobs {
                n_jobs: self.n_jobs,
            });
        }
        if self.n_jobs != 1 && !platform.parallel_workers {
            return Err(ScenarioError::ParallelUnsupported {
                n_jobs: self.n_jobs,
            });
        }
        if let Some(seed) = self.seed {
            check_seed(seed)?;
        }
        Ok(())
    }
}

fn check_seed(seed: u64) -> Result<(), ScenarioError> {
    if seed > MAX_ENGINE_SEED {
        return Err(ScenarioError::SeedOutOfRange {
            seed,
            max: MAX_ENGINE_SEED,
        });
    }
    Ok(())
}

/// A validated, immutable scenario.
///
/// `I` is the caller's instance type; instances are opaque to the engine,
/// which only ever sees their indices.
pub struct Scenario<I = ()> {
    config: ScenarioConfig,
    instances: Option<Arc<[I]>>,
}

impl Scenario<()> {
    pub fn builder() -> ScenarioBuilder<()> {
        ScenarioBuilder::default()
    }
}

impl<I> Scenario<I> {
    /// Validates `config` and the instance list; fails fast.
    pub fn from_config(
        config: ScenarioConfig,
        instances: Option<Vec<I>>,
        platform: &Platform,
    ) -> Result<Self, ScenarioError> {
        config.validate(platform)?;
        if matches!(&instances, Some(list) if list.is_empty()) {
            return Err(ScenarioError::EmptyInstances);
        }
        Ok(Self {
            config,
            instances: instances.map(Arc::from),
        })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn max_experiments(&self) -> Option<u64> {
        self.config.max_experiments
    }

    pub fn min_experiments(&self) -> Option<u64> {
        self.config.min_experiments
    }

    pub fn elitist(&self) -> bool {
        self.config.elitist
    }

    pub fn deterministic(&self) -> bool {
        self.config.deterministic
    }

    pub fn n_jobs(&self) -> i32 {
        self.config.n_jobs
    }

    pub fn seed(&self) -> Option<u64> {
        self.config.seed
    }

    pub fn verbose(&self) -> u32 {
        self.config.verbose
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.config.log_file.as_deref()
    }

    pub fn exec_dir(&self) -> Option<&Path> {
        self.config.exec_dir.as_deref()
    }

    pub fn instances(&self) -> Option<&[I]> {
        self.instances.as_deref()
    }

    pub fn instance(&self, index: usize) -> Option<&I> {
        self.instances.as_deref().and_then(|list| list.get(index))
    }

    /// Same scenario with a different seed; instances are shared.
    pub fn with_seed(&self, seed: u64) -> Result<Self, ScenarioError> {
        check_seed(seed)?;
        Ok(Self {
            config: ScenarioConfig {
                seed: Some(seed),
                ..self.config.clone()
            },
            instances: self.instances.clone(),
        })
    }

    /// The record the engine consumes.
    pub fn to_record(&self) -> ScenarioRecord {
        let instances = match self.instances() {
            Some(list) => (0..list.len()).collect(),
            // the engine needs at least one instance to race on
            None => vec![0],
        };

        ScenarioRecord {
            max_experiments: self.config.max_experiments,
            min_experiments: self.config.min_experiments,
            elitist: u8::from(self.config.elitist),
            deterministic: u8::from(self.config.deterministic),
            quiet: u8::from(self.config.verbose == 0),
            debug_level: self.config.verbose,
            parallel: self.config.n_jobs,
            log_file: self
                .config
                .log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            instances,
            seed: self.config.seed,
            exec_dir: self
                .config
                .exec_dir
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}

impl<I> Clone for Scenario<I> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            instances: self.instances.clone(),
        }
    }
}

impl<I> fmt::Debug for Scenario<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("config", &self.config)
            .field("instances", &self.instances.as_ref().map(|list| list.len()))
            .finish()
    }
}

/// Fluent construction of a [`Scenario`].
#[derive(Debug, Clone)]
pub struct ScenarioBuilder<I> {
    config: ScenarioConfig,
    instances: Option<Vec<I>>,
    platform: Option<Platform>,
}

impl Default for ScenarioBuilder<()> {
    fn default() -> Self {
        Self {
            config: ScenarioConfig::default(),
            instances: None,
            platform: None,
        }
    }
}

impl<I> ScenarioBuilder<I> {
    pub fn max_experiments(mut self, n: u64) -> Self {
        self.config.max_experiments = Some(n);
        self
    }

    pub fn min_experiments(mut self, n: u64) -> Self {
        self.config.min_experiments = Some(n);
        self
    }

    pub fn elitist(mut self, elitist: bool) -> Self {
        self.config.elitist = elitist;
        self
    }

    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.config.deterministic = deterministic;
        self
    }

    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.config.n_jobs = n_jobs;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn verbose(mut self, verbose: u32) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_file = Some(path.into());
        self
    }

    pub fn exec_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.exec_dir = Some(path.into());
        self
    }

    /// Sets the instance list, fixing the instance type.
    pub fn instances<J>(self, instances: impl IntoIterator<Item = J>) -> ScenarioBuilder<J> {
        ScenarioBuilder {
            config: self.config,
            instances: Some(instances.into_iter().collect()),
            platform: self.platform,
        }
    }

    /// Overrides host detection.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn build(self) -> Result<Scenario<I>, ScenarioError> {
        let platform = self.platform.unwrap_or_else(Platform::detect);
        Scenario::from_config(self.config, self.instances, &platform)
    }
}

/// Scenario fields in the engine's naming, with booleans as `0/1`.
///
/// The target runner travels next to this record in the engine request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_experiments: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_experiments: Option<u64>,
    pub elitist: u8,
    pub deterministic: u8,
    pub quiet: u8,
    pub debug_level: u32,
    pub parallel: i32,
    pub log_file: String,
    pub instances: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_dir: Option<String>,
}

impl ScenarioRecord {
    /// Scenario-file text, one `key = value` line per field.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(11);
        if let Some(n) = self.max_experiments {
            lines.push(format!("maxExperiments = {n}"));
        }
        if let Some(n) = self.min_experiments {
            lines.push(format!("minExperiments = {n}"));
        }
        lines.push(format!("elitist = {}", self.elitist));
        lines.push(format!("deterministic = {}", self.deterministic));
        lines.push(format!("quiet = {}", self.quiet));
        lines.push(format!("debugLevel = {}", self.debug_level));
        lines.push(format!("parallel = {}", self.parallel));
        lines.push(format!("logFile = {}", quote(&self.log_file)));
        let instances: Vec<String> = self.instances.iter().map(|i| i.to_string()).collect();
        lines.push(format!("instances = c({})", instances.join(", ")));
        if let Some(seed) = self.seed {
            lines.push(format!("seed = {seed}"));
        }
        if let Some(dir) = &self.exec_dir {
            lines.push(format!("execDir = {}", quote(dir)));
        }

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}
