//! The cost contract between a target runner and the racing engine.

use indexmap::IndexMap;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::errors::AdapterError;
use crate::value::RawValue;

/// Key every cost record carries.
pub const COST_KEY: &str = "cost";
/// Optional key holding the evaluation time.
pub const TIME_KEY: &str = "time";
/// Key present only on contained failures.
pub const ERROR_KEY: &str = "error";

/// What a target runner reports for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cost {
    /// A single cost value.
    Scalar(f64),
    /// Cost together with the time the evaluation took.
    Timed { cost: f64, time: f64 },
    /// Named metrics; must include `cost`.
    Metrics(IndexMap<String, f64>),
}

/// Conversion of a target runner's return value into a [`Cost`].
///
/// Failing conversions are contract violations of the runner, not failures
/// of the evaluation itself.
pub trait IntoCost {
    fn into_cost(self) -> Result<Cost, AdapterError>;
}

impl IntoCost for Cost {
    fn into_cost(self) -> Result<Cost, AdapterError> {
        Ok(self)
    }
}

macro_rules! scalar_cost {
    ($($ty:ty),*) => {
        $(
            impl IntoCost for $ty {
                fn into_cost(self) -> Result<Cost, AdapterError> {
                    numeric(COST_KEY, &self).map(Cost::Scalar)
                }
            }
        )*
    };
}

scalar_cost!(f64, f32, i32, i64, u32, u64, usize);

impl<A: ToPrimitive, B: ToPrimitive> IntoCost for (A, B) {
    fn into_cost(self) -> Result<Cost, AdapterError> {
        Ok(Cost::Timed {
            cost: numeric(COST_KEY, &self.0)?,
            time: numeric(TIME_KEY, &self.1)?,
        })
    }
}

fn metrics_cost<'a, V, I>(entries: I) -> Result<Cost, AdapterError>
where
    V: ToPrimitive + 'a,
    I: IntoIterator<Item = (&'a String, &'a V)>,
{
    let metrics = entries
        .into_iter()
        .map(|(key, value)| Ok((key.clone(), numeric(key, value)?)))
        .collect::<Result<IndexMap<_, _>, AdapterError>>()?;
    Ok(Cost::Metrics(metrics))
}

impl<V: ToPrimitive> IntoCost for IndexMap<String, V> {
    fn into_cost(self) -> Result<Cost, AdapterError> {
        metrics_cost(&self)
    }
}

impl<V: ToPrimitive> IntoCost for BTreeMap<String, V> {
    fn into_cost(self) -> Result<Cost, AdapterError> {
        metrics_cost(&self)
    }
}

impl<V: ToPrimitive> IntoCost for HashMap<String, V> {
    fn into_cost(self) -> Result<Cost, AdapterError> {
        // HashMap iteration order is arbitrary; sort for a deterministic record.
        let sorted: BTreeMap<&String, &V> = self.iter().collect();
        metrics_cost(sorted)
    }
}

impl IntoCost for serde_json::Value {
    fn into_cost(self) -> Result<Cost, AdapterError> {
        match self {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Cost::Scalar)
                .ok_or_else(|| invalid_shape(&n.to_string())),
            serde_json::Value::Array(items) if items.len() == 2 => Ok(Cost::Timed {
                cost: json_number(COST_KEY, &items[0])?,
                time: json_number(TIME_KEY, &items[1])?,
            }),
            serde_json::Value::Object(entries) => {
                let metrics = entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), json_number(key, value)?)))
                    .collect::<Result<IndexMap<_, _>, AdapterError>>()?;
                Ok(Cost::Metrics(metrics))
            }
            other => Err(invalid_shape(&other.to_string())),
        }
    }
}

fn numeric<V: ToPrimitive>(key: &str, value: &V) -> Result<f64, AdapterError> {
    value.to_f64().ok_or_else(|| AdapterError::NonNumericMetric {
        key: key.to_string(),
        found: "unrepresentable number".to_string(),
    })
}

fn json_number(key: &str, value: &serde_json::Value) -> Result<f64, AdapterError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AdapterError::NonNumericMetric {
        key: key.to_string(),
        found: value.to_string(),
    })
}

fn invalid_shape(found: &str) -> AdapterError {
    AdapterError::InvalidCostShape {
        found: found.to_string(),
    }
}

/// Canonical result of one evaluation as returned to the engine.
///
/// On the wire this is always a named mapping with at least `cost`; `error`
/// is present only when the evaluation failed and was contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(flatten)]
    pub metrics: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CostRecord {
    pub fn new(cost: f64) -> Self {
        Self {
            cost,
            time: None,
            metrics: IndexMap::new(),
            error: None,
        }
    }

    /// Worst-case record for an evaluation that failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            cost: f64::INFINITY,
            time: None,
            metrics: IndexMap::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Wire form: `cost`, then `time`, then remaining metrics, then `error`.
    pub fn to_wire(&self) -> IndexMap<String, RawValue> {
        let mut wire = IndexMap::with_capacity(self.metrics.len() + 3);
        wire.insert(COST_KEY.to_string(), RawValue::Float(self.cost));
        if let Some(time) = self.time {
            wire.insert(TIME_KEY.to_string(), RawValue::Float(time));
        }
        for (key, value) in &self.metrics {
            wire.insert(key.clone(), RawValue::Float(*value));
        }
        if let Some(error) = &self.error {
            wire.insert(ERROR_KEY.to_string(), RawValue::Str(error.clone()));
        }
        wire
    }
}

impl TryFrom<Cost> for CostRecord {
    type Error = AdapterError;

    fn try_from(cost: Cost) -> Result<Self, Self::Error> {
        match cost {
            Cost::Scalar(cost) => Ok(Self::new(cost)),
            Cost::Timed { cost, time } => Ok(Self {
                time: Some(time),
                ..Self::new(cost)
            }),
            Cost::Metrics(mut metrics) => {
                let cost = metrics
                    .shift_remove(COST_KEY)
                    .ok_or(AdapterError::MissingCost)?;
                let time = metrics.shift_remove(TIME_KEY);
                Ok(Self {
                    cost,
                    time,
                    metrics,
                    error: None,
                })
            }
        }
    }
}
