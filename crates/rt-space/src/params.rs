//! Typed parameter subspaces.

use rt_types::{Scalar, SpaceError};
use serde::{Deserialize, Serialize};

use crate::expression::{format_number, quote, Expression, Param};

/// A numeric bound: a fixed value, or an expression the engine resolves at
/// sampling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bound<T> {
    Fixed(T),
    /// Never evaluated locally; passed through to the engine unresolved.
    Dependent(Expression),
}

impl<T> Bound<T> {
    pub fn fixed(&self) -> Option<&T> {
        match self {
            Self::Fixed(v) => Some(v),
            Self::Dependent(_) => None,
        }
    }

    pub fn expression(&self) -> Option<&Expression> {
        match self {
            Self::Fixed(_) => None,
            Self::Dependent(expr) => Some(expr),
        }
    }
}

impl From<f64> for Bound<f64> {
    fn from(v: f64) -> Self {
        Self::Fixed(v)
    }
}

impl From<i32> for Bound<f64> {
    fn from(v: i32) -> Self {
        Self::Fixed(f64::from(v))
    }
}

impl From<i64> for Bound<i64> {
    fn from(v: i64) -> Self {
        Self::Fixed(v)
    }
}

impl From<i32> for Bound<i64> {
    fn from(v: i32) -> Self {
        Self::Fixed(i64::from(v))
    }
}

/// A bare name is shorthand for a reference to that parameter.
impl<T> From<&str> for Bound<T> {
    fn from(name: &str) -> Self {
        Self::Dependent(Expression::ValueOf(name.to_string()))
    }
}

impl<T> From<Param> for Bound<T> {
    fn from(param: Param) -> Self {
        Self::Dependent(param.into())
    }
}

impl<T> From<Expression> for Bound<T> {
    fn from(expr: Expression) -> Self {
        Self::Dependent(expr)
    }
}

/// The kind-specific part of a subspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    Real {
        lower: Bound<f64>,
        upper: Bound<f64>,
        log: bool,
    },
    Integer {
        lower: Bound<i64>,
        upper: Bound<i64>,
        log: bool,
    },
    Categorical {
        values: Vec<Scalar>,
    },
    /// Values in rank order.
    Ordinal {
        values: Vec<Scalar>,
    },
    /// Two-valued discrete parameter with labels `[false, true]`.
    Bool,
}

/// Subspace kinds, without their data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Real,
    Integer,
    Categorical,
    Ordinal,
    Bool,
}

impl ParameterKind {
    /// Type tag in the parameter-file grammar.
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Real => "r",
            Self::Integer => "i",
            Self::Categorical | Self::Bool => "c",
            Self::Ordinal => "o",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Real | Self::Integer)
    }

    pub fn is_discrete(self) -> bool {
        !self.is_numeric()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Integer => "integer",
            Self::Categorical => "categorical",
            Self::Ordinal => "ordinal",
            Self::Bool => "bool",
        }
    }
}

static BOOL_LABELS: [Scalar; 2] = [Scalar::Bool(false), Scalar::Bool(true)];

/// One named, typed dimension of a parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subspace {
    pub name: String,
    pub condition: Option<Expression>,
    pub domain: Domain,
}

impl Subspace {
    pub fn real(
        name: impl Into<String>,
        lower: impl Into<Bound<f64>>,
        upper: impl Into<Bound<f64>>,
    ) -> Self {
        Self::with_domain(
            name,
            Domain::Real {
                lower: lower.into(),
                upper: upper.into(),
                log: false,
            },
        )
    }

    pub fn integer(
        name: impl Into<String>,
        lower: impl Into<Bound<i64>>,
        upper: impl Into<Bound<i64>>,
    ) -> Self {
        Self::with_domain(
            name,
            Domain::Integer {
                lower: lower.into(),
                upper: upper.into(),
                log: false,
            },
        )
    }

    pub fn categorical<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Self::with_domain(
            name,
            Domain::Categorical {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn ordinal<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Self::with_domain(
            name,
            Domain::Ordinal {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::with_domain(name, Domain::Bool)
    }

    fn with_domain(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            condition: None,
            domain,
        }
    }

    /// Samples on a log axis. No effect on discrete subspaces.
    pub fn log(mut self) -> Self {
        match &mut self.domain {
            Domain::Real { log, .. } | Domain::Integer { log, .. } => *log = true,
            _ => {}
        }
        self
    }

    /// Active only when `condition` holds.
    pub fn when(mut self, condition: impl Into<Expression>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn kind(&self) -> ParameterKind {
        match self.domain {
            Domain::Real { .. } => ParameterKind::Real,
            Domain::Integer { .. } => ParameterKind::Integer,
            Domain::Categorical { .. } => ParameterKind::Categorical,
            Domain::Ordinal { .. } => ParameterKind::Ordinal,
            Domain::Bool => ParameterKind::Bool,
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(
            self.domain,
            Domain::Real { log: true, .. } | Domain::Integer { log: true, .. }
        )
    }

    /// Declared labels of a discrete subspace; empty for numeric ones.
    pub fn labels(&self) -> &[Scalar] {
        match &self.domain {
            Domain::Categorical { values } | Domain::Ordinal { values } => values,
            Domain::Bool => &BOOL_LABELS,
            Domain::Real { .. } | Domain::Integer { .. } => &[],
        }
    }

    /// Position of `label` among the declared labels.
    pub fn label_index(&self, label: &Scalar) -> Option<usize> {
        self.labels().iter().position(|candidate| candidate == label)
    }

    /// Dependent bound expressions, lower first.
    pub fn bound_expressions(&self) -> Vec<&Expression> {
        match &self.domain {
            Domain::Real { lower, upper, .. } => [lower.expression(), upper.expression()]
                .into_iter()
                .flatten()
                .collect(),
            Domain::Integer { lower, upper, .. } => [lower.expression(), upper.expression()]
                .into_iter()
                .flatten()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Checks everything that does not depend on other parameters.
    pub fn validate(&self) -> Result<(), SpaceError> {
        if !is_valid_name(&self.name) {
            return Err(SpaceError::InvalidName {
                name: self.name.clone(),
            });
        }

        match &self.domain {
            Domain::Real { lower, upper, log } => {
                if let (Some(lo), Some(hi)) = (lower.fixed(), upper.fixed()) {
                    self.check_range(*lo, *hi, *log)?;
                } else {
                    for bound in [lower.fixed(), upper.fixed()].into_iter().flatten() {
                        if !bound.is_finite() {
                            return Err(self.bounds_error(format!("bound {bound} is not finite")));
                        }
                    }
                }
            }
            Domain::Integer { lower, upper, log } => {
                if let (Some(lo), Some(hi)) = (lower.fixed(), upper.fixed()) {
                    self.check_range(*lo as f64, *hi as f64, *log)?;
                }
            }
            Domain::Categorical { values } | Domain::Ordinal { values } => {
                if values.is_empty() {
                    return Err(SpaceError::EmptyValues {
                        parameter: self.name.clone(),
                    });
                }
                for (i, value) in values.iter().enumerate() {
                    if values[..i].contains(value) {
                        return Err(SpaceError::DuplicateLabel {
                            parameter: self.name.clone(),
                            label: value.to_string(),
                        });
                    }
                }
            }
            Domain::Bool => {}
        }
        Ok(())
    }

    fn check_range(&self, lower: f64, upper: f64, log: bool) -> Result<(), SpaceError> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(self.bounds_error("bounds must be finite".to_string()));
        }
        if lower >= upper {
            return Err(self.bounds_error(format!(
                "lower bound {lower} must be smaller than upper bound {upper}"
            )));
        }
        if log && lower <= 0.0 {
            return Err(self.bounds_error(format!(
                "log scale requires a positive lower bound, got {lower}"
            )));
        }
        Ok(())
    }

    fn bounds_error(&self, message: String) -> SpaceError {
        SpaceError::InvalidBounds {
            parameter: self.name.clone(),
            message,
        }
    }

    /// One parameter-file line. `condition` is the already-encoded condition
    /// text, if any.
    pub(crate) fn render_line(&self, condition: Option<&str>) -> String {
        let log = if self.is_log() { ",log" } else { "" };
        let range = match &self.domain {
            Domain::Real { lower, upper, .. } => {
                format!(
                    "({}, {})",
                    render_bound(lower, |v| format_number(*v)),
                    render_bound(upper, |v| format_number(*v))
                )
            }
            Domain::Integer { lower, upper, .. } => {
                format!(
                    "({}, {})",
                    render_bound(lower, i64::to_string),
                    render_bound(upper, i64::to_string)
                )
            }
            Domain::Categorical { .. } | Domain::Ordinal { .. } | Domain::Bool => {
                let indices: Vec<String> = (0..self.labels().len()).map(|i| i.to_string()).collect();
                format!("({})", indices.join(","))
            }
        };

        let mut line = format!("{} \"\" {}{} {}", self.name, self.kind().type_tag(), log, range);
        if let Some(condition) = condition {
            line.push_str(" | ");
            line.push_str(condition);
        }
        line
    }
}

/// Dependent bounds are quoted so the engine resolves them when sampling.
fn render_bound<T>(bound: &Bound<T>, fixed: impl Fn(&T) -> String) -> String {
    match bound {
        Bound::Fixed(v) => fixed(v),
        Bound::Dependent(expr) => quote(&expr.render()),
    }
}

/// ASCII alphanumerics, `_` and `.`; must not start with a digit or `.`,
/// which marks engine metadata.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
