//! Evaluation adapter between the engine callback and the caller's runner.
//!
//! Decodes raw experiments into typed ones, invokes the target runner and
//! normalizes whatever it produces into a [`CostRecord`]. Failures inside the
//! runner, including panics, are contained and scored as `+inf`; contract
//! violations are not.

use crate::engine::ForeignRunner;
use crate::scenario::Scenario;
use rt_space::{ParameterSpace, Repair};
use rt_types::{AdapterError, Cost, CostRecord, Experiment, IntoCost, RawExperiment, RawValue};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Outcome of one target runner invocation, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Cost(Cost),
    /// The runner returned something that is not a valid cost.
    Contract(AdapterError),
    /// The runner itself failed.
    Failed(String),
}

/// The caller's objective function.
pub trait TargetRunner<I>: Send + Sync {
    fn evaluate(&self, experiment: &Experiment<'_, I>, scenario: &Scenario<I>) -> Evaluation;
}

/// Adapts a closure returning `anyhow::Result<C>` into a [`TargetRunner`].
pub struct FnRunner<F, C> {
    f: F,
    _cost: PhantomData<fn() -> C>,
}

impl<F, C> FnRunner<F, C> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _cost: PhantomData,
        }
    }
}

impl<I, F, C> TargetRunner<I> for FnRunner<F, C>
where
    F: Fn(&Experiment<'_, I>, &Scenario<I>) -> anyhow::Result<C> + Send + Sync,
    C: IntoCost,
{
    fn evaluate(&self, experiment: &Experiment<'_, I>, scenario: &Scenario<I>) -> Evaluation {
        match (self.f)(experiment, scenario) {
            Ok(value) => match value.into_cost() {
                Ok(cost) => Evaluation::Cost(cost),
                Err(violation) => Evaluation::Contract(violation),
            },
            Err(error) => Evaluation::Failed(format!("{error:#}")),
        }
    }
}

/// Turns an evaluation into the record returned to the engine.
pub fn normalize(evaluation: Evaluation) -> Result<CostRecord, AdapterError> {
    match evaluation {
        Evaluation::Cost(cost) => CostRecord::try_from(cost),
        Evaluation::Contract(violation) => Err(violation),
        Evaluation::Failed(message) => Ok(CostRecord::failed(message)),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Binds a space, a scenario and a target runner into the engine callback.
pub struct EvaluationAdapter<I> {
    space: Arc<ParameterSpace>,
    scenario: Arc<Scenario<I>>,
    runner: Arc<dyn TargetRunner<I>>,
}

impl<I> Clone for EvaluationAdapter<I> {
    fn clone(&self) -> Self {
        Self {
            space: Arc::clone(&self.space),
            scenario: Arc::clone(&self.scenario),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<I: Send + Sync + 'static> EvaluationAdapter<I> {
    pub fn new(
        space: Arc<ParameterSpace>,
        scenario: Arc<Scenario<I>>,
        runner: Arc<dyn TargetRunner<I>>,
    ) -> Self {
        Self {
            space,
            scenario,
            runner,
        }
    }

    /// Decodes identifiers, seed, instance and configuration.
    pub fn decode(&self, raw: &RawExperiment) -> Result<Experiment<'_, I>, AdapterError> {
        let configuration_id = identifier("id.configuration", &raw.configuration_id)?;
        let seed = seed(&raw.seed)?;

        let (instance_id, instance) = match self.scenario.instances() {
            Some(instances) => {
                let id = raw
                    .instance_id
                    .as_ref()
                    .ok_or_else(|| missing("id.instance"))?;
                let index = raw.instance.as_ref().ok_or_else(|| missing("instance"))?;
                let index = integer("instance", index)?;
                let instance = usize::try_from(index)
                    .ok()
                    .and_then(|i| instances.get(i))
                    .ok_or(AdapterError::InstanceOutOfRange {
                        index,
                        len: instances.len(),
                    })?;
                (Some(identifier("id.instance", id)?), Some(instance))
            }
            None => (None, None),
        };

        let configuration = raw.configuration.repair(&self.space)?;

        Ok(Experiment {
            configuration_id,
            instance_id,
            instance,
            seed,
            configuration,
        })
    }

    /// Full callback path for one experiment.
    ///
    /// `Err` is returned only for decode failures and contract violations;
    /// the engine treats those as fatal for the run.
    pub fn evaluate(&self, raw: &RawExperiment) -> Result<CostRecord, AdapterError> {
        let experiment = self.decode(raw)?;
        let evaluation = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runner.evaluate(&experiment, &self.scenario)
        }))
        .unwrap_or_else(|payload| {
            Evaluation::Failed(format!("target runner panicked: {}", panic_message(&*payload)))
        });

        if let Evaluation::Failed(message) = &evaluation {
            warn!(
                configuration = %experiment.configuration_id,
                instance = ?experiment.instance_id,
                error = %message,
                "target runner failed, scoring as +inf"
            );
        }
        normalize(evaluation)
    }

    pub fn into_foreign(self) -> ForeignRunner {
        Arc::new(move |raw: &RawExperiment| self.evaluate(raw))
    }
}

fn missing(field: &str) -> AdapterError {
    AdapterError::MissingField {
        field: field.to_string(),
    }
}

fn invalid(field: &str, value: &RawValue) -> AdapterError {
    AdapterError::InvalidField {
        field: field.to_string(),
        message: format!("unexpected {}", value.describe()),
    }
}

fn identifier(field: &str, value: &RawValue) -> Result<String, AdapterError> {
    match value {
        RawValue::Int(v) => Ok(v.to_string()),
        RawValue::Float(v) if v.fract() == 0.0 => Ok(format!("{}", *v as i64)),
        RawValue::Str(s) if !s.is_empty() => Ok(s.clone()),
        RawValue::Null => Err(missing(field)),
        other => Err(invalid(field, other)),
    }
}

fn integer(field: &str, value: &RawValue) -> Result<i64, AdapterError> {
    match value {
        RawValue::Int(v) => Ok(*v),
        RawValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Ok(*v as i64),
        RawValue::Str(s) => s.trim().parse().map_err(|_| invalid(field, value)),
        RawValue::Null => Err(missing(field)),
        other => Err(invalid(field, other)),
    }
}

fn seed(value: &RawValue) -> Result<u64, AdapterError> {
    let seed = integer("seed", value)?;
    u64::try_from(seed).map_err(|_| invalid("seed", value))
}
