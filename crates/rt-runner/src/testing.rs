//! In-process engines used by the tests.

use crate::engine::{EngineLogLevel, EngineRequest, RacingEngine, ResultTable};
use parking_lot::Mutex;
use rayon::prelude::*;
use rt_types::{AdapterError, CostRecord, EngineError, RawConfiguration, RawExperiment, RawValue};

/// Raw engine configuration from a JSON object.
pub(crate) fn candidate(value: serde_json::Value) -> RawConfiguration {
    match value {
        serde_json::Value::Object(entries) => entries
            .into_iter()
            .map(|(key, value)| (key, RawValue::from(value)))
            .collect(),
        other => panic!("candidate must be an object, got {other}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedRequest {
    pub run: String,
    pub parameters: String,
    pub seed: Option<u64>,
    pub instances: Vec<usize>,
    pub parallel: i32,
}

/// Evaluates a fixed candidate list on every instance and returns all
/// candidates ranked by mean cost.
pub(crate) struct ReplayEngine {
    candidates: Vec<RawConfiguration>,
    requests: Mutex<Vec<RecordedRequest>>,
    fail_runs: Vec<String>,
    panic_runs: Vec<String>,
}

impl ReplayEngine {
    pub fn new(candidates: Vec<RawConfiguration>) -> Self {
        Self {
            candidates,
            requests: Mutex::new(Vec::new()),
            fail_runs: Vec::new(),
            panic_runs: Vec::new(),
        }
    }

    pub fn failing_for(mut self, run: &str) -> Self {
        self.fail_runs.push(run.to_string());
        self
    }

    pub fn panicking_for(mut self, run: &str) -> Self {
        self.panic_runs.push(run.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl RacingEngine for ReplayEngine {
    fn name(&self) -> &str {
        "replay"
    }

    fn race(&self, request: &EngineRequest) -> Result<ResultTable, EngineError> {
        self.requests.lock().push(RecordedRequest {
            run: request.run.clone(),
            parameters: request.parameters.clone(),
            seed: request.scenario.seed,
            instances: request.scenario.instances.clone(),
            parallel: request.scenario.parallel,
        });

        if self.panic_runs.contains(&request.run) {
            panic!("engine crashed in {}", request.run);
        }
        if self.fail_runs.contains(&request.run) {
            return Err(EngineError::Invocation {
                message: format!("engine rejected {}", request.run),
            });
        }
        request.engine_log(EngineLogLevel::Info, "replaying candidates");

        let base_seed = request.scenario.seed.unwrap_or(0) as i64;
        let experiments: Vec<(usize, RawExperiment)> = self
            .candidates
            .iter()
            .enumerate()
            .flat_map(|(index, configuration)| {
                request.scenario.instances.iter().map(move |&instance| {
                    let experiment = RawExperiment {
                        configuration_id: RawValue::Int(index as i64 + 1),
                        instance_id: Some(RawValue::Int(instance as i64 + 1)),
                        instance: Some(RawValue::Int(instance as i64)),
                        seed: RawValue::Int(base_seed + instance as i64),
                        configuration: configuration.clone(),
                    };
                    (index, experiment)
                })
            })
            .collect();

        let records: Vec<Result<CostRecord, AdapterError>> = if request.scenario.parallel > 1 {
            experiments
                .par_iter()
                .map(|(_, experiment)| request.evaluate(experiment))
                .collect()
        } else {
            experiments
                .iter()
                .map(|(_, experiment)| request.evaluate(experiment))
                .collect()
        };

        let mut totals = vec![0.0_f64; self.candidates.len()];
        for ((index, _), record) in experiments.iter().zip(records) {
            totals[*index] += record?.cost;
        }
        let evaluations = request.scenario.instances.len().max(1) as f64;
        let means: Vec<f64> = totals.iter().map(|total| total / evaluations).collect();
        let mut order: Vec<usize> = (0..self.candidates.len()).collect();
        order.sort_by(|a, b| means[*a].total_cmp(&means[*b]));

        let mut columns = vec![".ID.".to_string()];
        for configuration in &self.candidates {
            for key in configuration.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        columns.push(".PARENT.".to_string());

        let mut table = ResultTable::new(columns.clone());
        for index in order {
            let row = columns
                .iter()
                .map(|column| match column.as_str() {
                    ".ID." => RawValue::Int(index as i64 + 1),
                    ".PARENT." => RawValue::Null,
                    name => self.candidates[index]
                        .get(name)
                        .cloned()
                        .unwrap_or(RawValue::Null),
                })
                .collect();
            table.push_row(row)?;
        }
        Ok(table)
    }
}

/// An engine whose invocation always fails.
pub(crate) struct FailingEngine;

impl RacingEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn race(&self, _request: &EngineRequest) -> Result<ResultTable, EngineError> {
        Err(EngineError::Invocation {
            message: "engine exited with status 1".to_string(),
        })
    }
}
