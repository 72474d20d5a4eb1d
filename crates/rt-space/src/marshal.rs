//! Type-directed conversion between raw engine values and typed
//! configuration values.
//!
//! Repair (`raw -> typed`) drops names the space does not declare, since the
//! engine mixes metadata into its records, maps every missing-value encoding
//! to `None`, and decodes index-encoded discrete parameters back to their
//! labels. Encoding is the inverse, so `repair(encode(v)) == v`.

use rt_types::{
    Configuration, MarshalError, ParameterValue, RawConfiguration, RawValue, Scalar,
};

use crate::params::{Domain, Subspace};
use crate::space::ParameterSpace;

/// Conversion of a configuration into the types declared by a space.
pub trait Repair {
    fn repair(&self, space: &ParameterSpace) -> Result<Configuration, MarshalError>;
}

impl Repair for RawConfiguration {
    fn repair(&self, space: &ParameterSpace) -> Result<Configuration, MarshalError> {
        let mut configuration = Configuration::with_capacity(self.len());
        for (name, raw) in self {
            let Some(subspace) = space.get_subspace(name) else {
                continue;
            };
            configuration.insert(name.clone(), repair_value(subspace, raw)?);
        }
        Ok(configuration)
    }
}

/// Already-typed configurations come back unchanged; only values that do not
/// fit their parameter are rejected.
impl Repair for Configuration {
    fn repair(&self, space: &ParameterSpace) -> Result<Configuration, MarshalError> {
        let mut configuration = Configuration::with_capacity(self.len());
        for (name, value) in self {
            let Some(subspace) = space.get_subspace(name) else {
                continue;
            };
            let checked = match value {
                Some(value) => Some(check_typed(subspace, value)?),
                None => None,
            };
            configuration.insert(name.clone(), checked);
        }
        Ok(configuration)
    }
}

/// Converts one raw value into the type `subspace` declares.
pub fn repair_value(
    subspace: &Subspace,
    raw: &RawValue,
) -> Result<Option<ParameterValue>, MarshalError> {
    if raw.is_missing() {
        return Ok(None);
    }

    let value = match &subspace.domain {
        Domain::Real { .. } => ParameterValue::Real(to_real(subspace, raw)?),
        Domain::Integer { .. } => ParameterValue::Integer(to_integer(subspace, raw)?),
        Domain::Bool => ParameterValue::Bool(to_bool(subspace, raw)?),
        Domain::Categorical { values } | Domain::Ordinal { values } => {
            let index = to_index(subspace, raw, values.len())?;
            ParameterValue::Label(values[index].clone())
        }
    };
    Ok(Some(value))
}

/// Engine encoding of a typed value.
pub fn encode_value(subspace: &Subspace, value: &ParameterValue) -> Result<RawValue, MarshalError> {
    let raw = match check_typed(subspace, value)? {
        ParameterValue::Real(v) => RawValue::Float(v),
        ParameterValue::Integer(v) => RawValue::Int(v),
        ParameterValue::Bool(v) => RawValue::Int(i64::from(v)),
        ParameterValue::Label(label) => match subspace.label_index(&label) {
            Some(index) => RawValue::Int(index as i64),
            None => {
                return Err(MarshalError::TypeMismatch {
                    parameter: subspace.name.clone(),
                    expected: expected_type(subspace),
                    found: ParameterValue::Label(label).describe(),
                })
            }
        },
    };
    Ok(raw)
}

/// Engine encoding of a typed configuration; unknown names are dropped and
/// inactive parameters become null.
pub fn encode_configuration(
    space: &ParameterSpace,
    configuration: &Configuration,
) -> Result<RawConfiguration, MarshalError> {
    let mut raw = RawConfiguration::with_capacity(configuration.len());
    for (name, value) in configuration {
        let Some(subspace) = space.get_subspace(name) else {
            continue;
        };
        let encoded = match value {
            Some(value) => encode_value(subspace, value)?,
            None => RawValue::Null,
        };
        raw.insert(name.clone(), encoded);
    }
    Ok(raw)
}

fn check_typed(subspace: &Subspace, value: &ParameterValue) -> Result<ParameterValue, MarshalError> {
    let fits = match (&subspace.domain, value) {
        (Domain::Real { .. }, ParameterValue::Real(_)) => true,
        (Domain::Real { .. }, ParameterValue::Integer(v)) => {
            return Ok(ParameterValue::Real(*v as f64));
        }
        (Domain::Integer { .. }, ParameterValue::Integer(_)) => true,
        (Domain::Bool, ParameterValue::Bool(_)) => true,
        (Domain::Categorical { values } | Domain::Ordinal { values }, ParameterValue::Label(label)) => {
            values.contains(label)
        }
        _ => false,
    };

    if fits {
        Ok(value.clone())
    } else {
        Err(MarshalError::TypeMismatch {
            parameter: subspace.name.clone(),
            expected: expected_type(subspace),
            found: value.describe(),
        })
    }
}

fn expected_type(subspace: &Subspace) -> String {
    match &subspace.domain {
        Domain::Categorical { values } | Domain::Ordinal { values } => {
            let labels: Vec<String> = values.iter().map(Scalar::to_string).collect();
            format!("one of [{}]", labels.join(", "))
        }
        _ => subspace.kind().name().to_string(),
    }
}

fn mismatch(subspace: &Subspace, expected: &str, raw: &RawValue) -> MarshalError {
    MarshalError::TypeMismatch {
        parameter: subspace.name.clone(),
        expected: expected.to_string(),
        found: raw.describe(),
    }
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn to_real(subspace: &Subspace, raw: &RawValue) -> Result<f64, MarshalError> {
    match raw {
        RawValue::Float(v) => Ok(*v),
        RawValue::Int(v) => Ok(*v as f64),
        RawValue::Str(s) => s.trim().parse().map_err(|_| mismatch(subspace, "real", raw)),
        _ => Err(mismatch(subspace, "real", raw)),
    }
}

fn to_integer(subspace: &Subspace, raw: &RawValue) -> Result<i64, MarshalError> {
    let parsed = match raw {
        RawValue::Int(v) => Some(*v),
        RawValue::Float(v) => integral(*v),
        RawValue::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed.ok_or_else(|| mismatch(subspace, "integer", raw))
}

fn to_bool(subspace: &Subspace, raw: &RawValue) -> Result<bool, MarshalError> {
    let parsed = match raw {
        RawValue::Bool(v) => Some(*v),
        RawValue::Int(0) => Some(false),
        RawValue::Int(1) => Some(true),
        RawValue::Float(v) if *v == 0.0 => Some(false),
        RawValue::Float(v) if *v == 1.0 => Some(true),
        RawValue::Str(s) => match s.trim() {
            "TRUE" | "true" | "T" | "1" => Some(true),
            "FALSE" | "false" | "F" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| mismatch(subspace, "bool", raw))
}

fn to_index(subspace: &Subspace, raw: &RawValue, len: usize) -> Result<usize, MarshalError> {
    let index = match raw {
        RawValue::Int(v) => Some(*v),
        RawValue::Float(v) => integral(*v),
        RawValue::Str(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| mismatch(subspace, "value index", raw))?;

    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| MarshalError::IndexOutOfRange {
            parameter: subspace.name.clone(),
            index,
            len,
        })
}
