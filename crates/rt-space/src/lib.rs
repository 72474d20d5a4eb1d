//! # rt-space
//!
//! Parameter space model for racetune.
//!
//! Provides the expression algebra used for conditions, dependent bounds and
//! forbidden regions, the typed parameter subspaces, rendering of a whole
//! space into the engine's parameter-file grammar, and the marshaling layer
//! that converts raw engine values into typed configurations.

pub mod expression;
pub mod marshal;
pub mod params;
pub mod space;

pub use expression::{
    format_number, lit, quote, render_scalar, value_of, BinaryOp, Expression, Param,
};
pub use marshal::{encode_configuration, encode_value, repair_value, Repair};
pub use params::{Bound, Domain, ParameterKind, Subspace};
pub use space::{ParameterSpace, ParameterSpaceBuilder, FORBIDDEN_MARKER};
