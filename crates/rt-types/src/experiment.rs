//! Experiment records exchanged with the racing engine.

use serde::{Deserialize, Serialize};

use crate::value::{Configuration, RawConfiguration, RawValue};

/// One evaluation request exactly as the engine delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExperiment {
    #[serde(rename = "id.configuration")]
    pub configuration_id: RawValue,
    #[serde(rename = "id.instance", default)]
    pub instance_id: Option<RawValue>,
    /// Index into the scenario's instance list.
    #[serde(default)]
    pub instance: Option<RawValue>,
    pub seed: RawValue,
    pub configuration: RawConfiguration,
}

/// A decoded experiment handed to a target runner.
///
/// `instance_id` and `instance` are set only when the scenario declares
/// instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment<'a, I> {
    pub configuration_id: String,
    pub instance_id: Option<String>,
    pub instance: Option<&'a I>,
    pub seed: u64,
    pub configuration: Configuration,
}
