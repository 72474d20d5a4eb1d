//! Executing several independent runs on a worker pool.

use crate::adapter::panic_message;
use crate::engine::RacingEngine;
use crate::run::{Run, RunOptions, RunReport, TuningResult};
use crate::scenario::Platform;
use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rt_types::{internal_error, EngineError, TuneError, TuneResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

use crate::scenario::MAX_ENGINE_SEED;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiRunOptions {
    /// Concurrent runs. Negative values count back from the available
    /// workers: `-1` uses all of them, `-2` all but one.
    pub n_jobs: i32,
    /// When set, every run gets a seed derived from this value and its
    /// position, replacing the scenario seed.
    pub global_seed: Option<u64>,
    pub run: RunOptions,
}

impl Default for MultiRunOptions {
    fn default() -> Self {
        Self {
            n_jobs: 1,
            global_seed: None,
            run: RunOptions::default(),
        }
    }
}

/// Number of workers for `n_jobs` on a host with `available` workers.
pub fn resolve_jobs(n_jobs: i32, available: usize) -> usize {
    let available = available.max(1);
    let jobs = if n_jobs < 0 {
        let skipped = n_jobs.unsigned_abs() as usize - 1;
        available.saturating_sub(skipped)
    } else {
        n_jobs as usize
    };
    jobs.max(1)
}

/// Seed for the run at `index`, in `1..=MAX_ENGINE_SEED`.
///
/// Depends only on the global seed and the index, so it is stable across
/// worker counts and scheduling.
pub fn derive_seed(global_seed: u64, index: usize) -> u64 {
    let mut rng = ChaCha8Rng::seed_from_u64(global_seed);
    rng.set_stream(index as u64);
    rng.gen_range(1..=MAX_ENGINE_SEED)
}

/// Gives every run a distinct name, using `run_<index>` for unnamed runs
/// and for repeated names.
fn resolve_names<I>(runs: &[Run<I>]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(runs.len());
    runs.iter()
        .enumerate()
        .map(|(index, run)| {
            let name = match run.name() {
                Some(name) if !name.is_empty() && !used.contains(name) => name.to_string(),
                _ => {
                    let mut placeholder = format!("run_{index}");
                    let mut suffix = 1;
                    while used.contains(&placeholder) {
                        placeholder = format!("run_{index}_{suffix}");
                        suffix += 1;
                    }
                    placeholder
                }
            };
            used.insert(name.clone());
            name
        })
        .collect()
}

/// Result of one run in a batch.
#[derive(Debug)]
pub struct RunOutcome {
    pub index: usize,
    pub name: String,
    /// Seed the run was executed with, if any.
    pub seed: Option<u64>,
    pub result: TuneResult<RunReport>,
}

/// Per-run outcomes in input order.
#[derive(Debug)]
pub struct MultiRunResults {
    outcomes: Vec<RunOutcome>,
}

impl MultiRunResults {
    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn into_outcomes(self) -> Vec<RunOutcome> {
        self.outcomes
    }

    pub fn into_results(self) -> Vec<TuneResult<TuningResult>> {
        self.outcomes
            .into_iter()
            .map(|o| o.result.map(|report| report.result))
            .collect()
    }

    pub fn into_named(self) -> IndexMap<String, TuneResult<TuningResult>> {
        self.outcomes
            .into_iter()
            .map(|o| (o.name, o.result.map(|report| report.result)))
            .collect()
    }
}

/// Executes `runs` concurrently. A failing or panicking run yields an error
/// in its own slot and never affects its siblings.
pub fn multi_tune<I>(
    engine: &dyn RacingEngine,
    runs: Vec<Run<I>>,
    options: &MultiRunOptions,
) -> TuneResult<MultiRunResults>
where
    I: Send + Sync + 'static,
{
    if runs.is_empty() {
        return Ok(MultiRunResults {
            outcomes: Vec::new(),
        });
    }

    let platform = Platform::detect();
    let workers = resolve_jobs(options.n_jobs, platform.available_workers).min(runs.len());
    let names = resolve_names(&runs);
    info!(
        runs = runs.len(),
        workers,
        global_seed = ?options.global_seed,
        "dispatching tuning runs"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("racetune-run-{i}"))
        .build()
        .map_err(|e| internal_error!("failed to start run pool: {}", e))?;

    let outcomes: Vec<RunOutcome> = pool.install(|| {
        runs.into_par_iter()
            .zip(names.into_par_iter())
            .enumerate()
            .map(|(index, (run, name))| execute_isolated(engine, run, index, name, options))
            .collect()
    });

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(runs = outcomes.len(), failed, "tuning runs finished");
    Ok(MultiRunResults { outcomes })
}

fn execute_isolated<I>(
    engine: &dyn RacingEngine,
    run: Run<I>,
    index: usize,
    name: String,
    options: &MultiRunOptions,
) -> RunOutcome
where
    I: Send + Sync + 'static,
{
    let run = match options.global_seed {
        Some(global) => {
            let seed = derive_seed(global, index);
            debug!(run = %name, index, seed, "derived run seed");
            match run.with_seed(seed) {
                Ok(run) => run,
                Err(err) => {
                    return RunOutcome {
                        index,
                        name: name.clone(),
                        seed: Some(seed),
                        result: Err(TuneError::RunFailed {
                            run: name,
                            stage: "seeding".to_string(),
                            source: Box::new(err.into()),
                        }),
                    }
                }
            }
        }
        None => run,
    };
    let seed = run.scenario().seed();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run.execute_as(&name, engine, &options.run)
    }))
    .unwrap_or_else(|payload| {
        let message = panic_message(&*payload);
        warn!(run = %name, error = %message, "tuning run panicked");
        Err(TuneError::RunFailed {
            run: name.clone(),
            stage: "executing".to_string(),
            source: Box::new(EngineError::Panicked { message }.into()),
        })
    });

    RunOutcome {
        index,
        name,
        seed,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use crate::testing::{candidate, ReplayEngine};
    use rt_space::ParameterSpace;
    use rt_types::{Experiment, ParameterValue};
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    fn space() -> ParameterSpace {
        ParameterSpace::builder()
            .add_real("x", -5.0, 5.0)
            .add_bool("shift")
            .build()
            .unwrap()
    }

    fn engine() -> ReplayEngine {
        ReplayEngine::new(vec![
            candidate(json!({"x": 3.0, "shift": 0})),
            candidate(json!({"x": -1.0, "shift": 1})),
            candidate(json!({"x": 0.5, "shift": 0})),
        ])
    }

    fn run(name: Option<&str>, seed: u64) -> Run<u32> {
        let scenario = Scenario::builder()
            .max_experiments(30)
            .instances([1_u32, 2])
            .seed(seed)
            .platform(Platform::new(false, 1))
            .build()
            .unwrap();
        let run = Run::new(space(), scenario, |experiment: &Experiment<'_, u32>, _| {
            let x = experiment.configuration["x"]
                .as_ref()
                .and_then(ParameterValue::as_f64)
                .unwrap_or(0.0);
            let scale = experiment.instance.copied().unwrap_or(1) as f64;
            Ok(x * x * scale)
        });
        match name {
            Some(name) => run.named(name),
            None => run,
        }
    }

    fn best_x(result: &TuningResult) -> Option<f64> {
        result.best()?.get("x")?.as_ref()?.as_f64()
    }

    #[test]
    fn job_resolution() {
        assert_eq!(resolve_jobs(1, 8), 1);
        assert_eq!(resolve_jobs(4, 8), 4);
        assert_eq!(resolve_jobs(0, 8), 1);
        assert_eq!(resolve_jobs(-1, 8), 8);
        assert_eq!(resolve_jobs(-2, 8), 7);
        assert_eq!(resolve_jobs(-20, 8), 1);
        assert_eq!(resolve_jobs(-1, 0), 1);
    }

    #[test]
    fn derived_seeds_are_stable_and_distinct() {
        let seeds: Vec<u64> = (0..16).map(|i| derive_seed(42, i)).collect();
        let again: Vec<u64> = (0..16).map(|i| derive_seed(42, i)).collect();
        assert_eq!(seeds, again);
        assert!(seeds.iter().all(|s| (1..=MAX_ENGINE_SEED).contains(s)));
        let distinct: HashSet<u64> = seeds.iter().copied().collect();
        assert_eq!(distinct.len(), seeds.len());
        assert_ne!(derive_seed(42, 0), derive_seed(43, 0));
    }

    #[test]
    fn names_are_unique() {
        let runs = vec![
            run(Some("a"), 1),
            run(None, 1),
            run(Some("a"), 1),
            run(Some("run_1"), 1),
        ];
        assert_eq!(resolve_names(&runs), vec!["a", "run_1", "run_2", "run_3"]);
    }

    #[test]
    fn results_keep_input_order() {
        let runs: Vec<Run<u32>> = (0..6).map(|i| run(Some(&format!("r{i}")), i)).collect();
        let options = MultiRunOptions {
            n_jobs: 3,
            ..MultiRunOptions::default()
        };
        let results = multi_tune(&engine(), runs, &options).unwrap();
        assert_eq!(results.len(), 6);
        for (i, outcome) in results.outcomes().iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.name, format!("r{i}"));
            assert_eq!(outcome.seed, Some(i as u64));
        }

        let named = results.into_named();
        let keys: Vec<&str> = named.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["r0", "r1", "r2", "r3", "r4", "r5"]);
        for result in named.values() {
            assert_eq!(best_x(result.as_ref().unwrap()), Some(0.5));
        }
    }

    #[test]
    fn slow_early_runs_keep_their_slots() {
        let targets = [3.0, -1.0, 0.5, 3.0];
        let runs: Vec<Run<u32>> = targets
            .iter()
            .enumerate()
            .map(|(i, &target)| {
                let scenario = Scenario::builder()
                    .max_experiments(30)
                    .instances([1_u32])
                    .platform(Platform::new(false, 1))
                    .build()
                    .unwrap();
                // lower indices sleep longer, so they finish last
                let delay = Duration::from_millis((targets.len() - i) as u64 * 15);
                Run::new(space(), scenario, move |experiment: &Experiment<'_, u32>, _| {
                    thread::sleep(delay);
                    let x = experiment.configuration["x"]
                        .as_ref()
                        .and_then(ParameterValue::as_f64)
                        .unwrap_or(0.0);
                    Ok((x - target).abs())
                })
                .named(format!("slow{i}"))
            })
            .collect();

        let options = MultiRunOptions {
            n_jobs: 4,
            ..MultiRunOptions::default()
        };
        let results = multi_tune(&engine(), runs, &options).unwrap();
        for (i, outcome) in results.outcomes().iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.name, format!("slow{i}"));
            let report = outcome.result.as_ref().unwrap();
            assert_eq!(best_x(&report.result), Some(targets[i]));
        }
    }

    #[test]
    fn global_seed_is_reproducible() {
        let options = MultiRunOptions {
            n_jobs: 2,
            global_seed: Some(123),
            ..MultiRunOptions::default()
        };
        let seeds = |engine: &ReplayEngine| {
            let mut seen: Vec<(String, Option<u64>)> = engine
                .requests()
                .into_iter()
                .map(|r| (r.run, r.seed))
                .collect();
            seen.sort();
            seen
        };

        let first = engine();
        let runs = vec![run(Some("a"), 1), run(Some("b"), 1), run(Some("c"), 1)];
        let outcomes = multi_tune(&first, runs, &options).unwrap();
        let second = engine();
        let runs = vec![run(Some("a"), 9), run(Some("b"), 9), run(Some("c"), 9)];
        multi_tune(&second, runs, &options).unwrap();

        assert_eq!(seeds(&first), seeds(&second));
        assert_eq!(
            seeds(&first),
            vec![
                ("a".to_string(), Some(derive_seed(123, 0))),
                ("b".to_string(), Some(derive_seed(123, 1))),
                ("c".to_string(), Some(derive_seed(123, 2))),
            ]
        );
        assert_eq!(outcomes.outcomes()[1].seed, Some(derive_seed(123, 1)));
    }

    #[test]
    fn failures_are_isolated() {
        let engine = engine().failing_for("bad").panicking_for("worse");
        let runs = vec![
            run(Some("good"), 1),
            run(Some("bad"), 2),
            run(Some("worse"), 3),
            run(Some("fine"), 4),
        ];
        let options = MultiRunOptions {
            n_jobs: 2,
            ..MultiRunOptions::default()
        };
        let results = multi_tune(&engine, runs, &options).unwrap();
        assert_eq!(results.failures().count(), 2);

        let results = results.into_results();
        assert!(results[0].is_ok());
        assert!(results[3].is_ok());
        match &results[1] {
            Err(TuneError::RunFailed { run, stage, .. }) => {
                assert_eq!(run, "bad");
                assert_eq!(stage, "invoking engine");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        match &results[2] {
            Err(TuneError::RunFailed { run, source, .. }) => {
                assert_eq!(run, "worse");
                assert!(matches!(
                    **source,
                    TuneError::Engine(EngineError::Panicked { .. })
                ));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn empty_batch() {
        let results = multi_tune::<()>(&engine(), Vec::new(), &MultiRunOptions::default()).unwrap();
        assert!(results.is_empty());
    }
}
