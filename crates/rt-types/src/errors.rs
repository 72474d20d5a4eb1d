use thiserror::Error;

/// Main error type for the racetune system
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Parameter space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Marshaling error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Run {run} failed while {stage}: {source}")]
    RunFailed {
        run: String,
        stage: String,
        #[source]
        source: Box<TuneError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while checking an expression against a parameter space.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String },

    #[error("parameter `{name}` is referenced before it is declared")]
    ForwardReference { name: String },

    #[error("parameter `{name}` refers to itself")]
    SelfReference { name: String },

    #[error("value {label} is not a declared value of parameter `{parameter}`")]
    UnknownLabel { parameter: String, label: String },

    #[error("parameter `{parameter}` is unordered and cannot be compared with `{operator}`")]
    UnorderedComparison { parameter: String, operator: String },

    #[error("parameter `{name}` is not numeric and cannot appear in a bound")]
    NonNumericReference { name: String },

    #[error("set membership test on `{parameter}` has no values")]
    EmptySet { parameter: String },

    #[error("invalid function name `{name}`")]
    InvalidFunction { name: String },

    #[error("expected a logical expression, found a {found} value")]
    NotLogical { found: String },

    #[error("operator `{operator}` cannot compare a {left} value with a {right} value")]
    OperandMismatch {
        operator: String,
        left: String,
        right: String,
    },

    #[error("parameter `{parameter}` is {expected} and cannot be matched against a {found} literal")]
    LiteralType {
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("bound `{expression}` references no parameter")]
    ConstantBound { expression: String },

    #[error("bound terms must be numeric, found a {found} value")]
    NonNumericTerm { found: String },
}

/// Construction errors for parameter subspaces and spaces.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("invalid parameter name `{name}`")]
    InvalidName { name: String },

    #[error("duplicate parameter name `{name}`")]
    DuplicateName { name: String },

    #[error("parameter `{parameter}` declares no values")]
    EmptyValues { parameter: String },

    #[error("parameter `{parameter}` declares value {label} more than once")]
    DuplicateLabel { parameter: String, label: String },

    #[error("invalid bounds for `{parameter}`: {message}")]
    InvalidBounds { parameter: String, message: String },

    #[error("invalid condition on `{parameter}`: {source}")]
    InvalidCondition {
        parameter: String,
        #[source]
        source: ExpressionError,
    },

    #[error("invalid bound on `{parameter}`: {source}")]
    InvalidBound {
        parameter: String,
        #[source]
        source: ExpressionError,
    },

    #[error("invalid forbidden expression #{index}: {source}")]
    InvalidForbidden {
        index: usize,
        #[source]
        source: ExpressionError,
    },
}

/// Errors raised while converting raw engine values into typed values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("type mismatch for `{parameter}`: expected {expected}, found {found}")]
    TypeMismatch {
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("index {index} out of range for `{parameter}` with {len} values")]
    IndexOutOfRange {
        parameter: String,
        index: i64,
        len: usize,
    },
}

/// Violations of the evaluation contract between the engine and a target runner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("cost mapping has no `cost` entry")]
    MissingCost,

    #[error("metric `{key}` is not numeric: {found}")]
    NonNumericMetric { key: String, found: String },

    #[error("target runner returned an invalid result: {found}")]
    InvalidCostShape { found: String },

    #[error("experiment field `{field}` is missing")]
    MissingField { field: String },

    #[error("experiment field `{field}` is invalid: {message}")]
    InvalidField { field: String, message: String },

    #[error("instance index {index} out of range for {len} instances")]
    InstanceOutOfRange { index: i64, len: usize },

    #[error("experiment configuration could not be decoded: {0}")]
    Decode(#[from] MarshalError),
}

/// Scenario validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("one of max_experiments or min_experiments must be set")]
    MissingBudget,

    #[error("max_experiments and min_experiments are mutually exclusive")]
    ConflictingBudget,

    #[error("experiment budget must be positive, got {value}")]
    InvalidBudget { value: u64 },

    #[error("n_jobs must not be negative, got {n_jobs}")]
    InvalidJobs { n_jobs: i32 },

    #[error("parallel execution (n_jobs = {n_jobs}) is not supported on this platform")]
    ParallelUnsupported { n_jobs: i32 },

    #[error("instance list is empty")]
    EmptyInstances,

    #[error("seed {seed} is out of range, the engine accepts at most {max}")]
    SeedOutOfRange { seed: u64, max: u64 },
}

/// Failures of the collaborator racing engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("engine invocation failed: {message}")]
    Invocation { message: String },

    #[error("malformed result table: {message}")]
    MalformedResult { message: String },

    #[error("engine panicked: {message}")]
    Panicked { message: String },

    #[error("target runner violated the evaluation contract: {0}")]
    Contract(#[from] AdapterError),
}

/// Result type alias for racetune operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MarshalError::TypeMismatch {
            parameter: "alpha".to_string(),
            expected: "real".to_string(),
            found: "string \"abc\"".to_string(),
        };

        assert!(error.to_string().contains("type mismatch"));
        assert!(error.to_string().contains("alpha"));
        assert!(error.to_string().contains("real"));
    }

    #[test]
    fn test_error_conversion() {
        let scenario_error = ScenarioError::MissingBudget;
        let tune_error: TuneError = scenario_error.into();

        match tune_error {
            TuneError::Scenario(ScenarioError::MissingBudget) => (),
            _ => panic!("Expected Scenario error"),
        }
    }

    #[test]
    fn test_run_failure_keeps_source() {
        let error = TuneError::RunFailed {
            run: "dual_annealing".to_string(),
            stage: "invoking engine".to_string(),
            source: Box::new(
                EngineError::Invocation {
                    message: "boom".to_string(),
                }
                .into(),
            ),
        };

        let text = error.to_string();
        assert!(text.contains("dual_annealing"));
        assert!(text.contains("invoking engine"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_macros() {
        let internal = internal_error!("Something went wrong: {}", 42);
        assert!(matches!(internal, TuneError::Internal(_)));
        let config = config_error!("Missing required field: {}", "max_experiments");
        assert!(config.to_string().contains("max_experiments"));
    }
}
