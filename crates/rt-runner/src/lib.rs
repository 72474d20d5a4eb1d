//! # rt-runner
//!
//! Runs tuning jobs against a racing engine.
//!
//! A [`Run`] combines a parameter space, a validated [`Scenario`] and a
//! target runner. Executing it renders the space, wraps the target runner in
//! an [`EvaluationAdapter`] that the engine calls once per experiment, and
//! decodes the engine's elite table into typed configurations.
//! [`multi_tune`] executes independent runs on a worker pool.
//!
//! ## Example
//!
//! ```ignore
//! use rt_runner::{Platform, Run, RunOptions, Scenario};
//! use rt_space::ParameterSpace;
//!
//! let space = ParameterSpace::builder()
//!     .add_real("x", -5.0, 5.0)
//!     .build()?;
//! let scenario = Scenario::builder()
//!     .max_experiments(200)
//!     .platform(Platform::detect())
//!     .build()?;
//! let run = Run::new(space, scenario, |experiment, _| {
//!     let x = experiment.configuration["x"].as_ref().and_then(|v| v.as_f64());
//!     Ok(x.unwrap_or(0.0).powi(2))
//! });
//! let report = run.execute(&engine, &RunOptions::default())?;
//! ```

pub mod adapter;
pub mod engine;
pub mod logging;
pub mod multi;
pub mod run;
pub mod scenario;

#[cfg(test)]
mod testing;

pub use adapter::{normalize, Evaluation, EvaluationAdapter, FnRunner, TargetRunner};
pub use engine::{
    is_metadata_column, EngineLogLevel, EngineRequest, ForeignRunner, RacingEngine, ResultTable,
};
pub use logging::init_tracing;
pub use multi::{
    derive_seed, multi_tune, resolve_jobs, MultiRunOptions, MultiRunResults, RunOutcome,
};
pub use run::{
    decode_results, tune, ConfigurationTable, Run, RunOptions, RunReport, RunState, RunStatus,
    TunedConfiguration, TuningResult,
};
pub use scenario::{
    Platform, Scenario, ScenarioBuilder, ScenarioConfig, ScenarioRecord, MAX_ENGINE_SEED,
};
