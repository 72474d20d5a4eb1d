pub mod cost;
pub mod errors;
pub mod experiment;
pub mod value;

pub use cost::*;
pub use errors::*;
pub use experiment::*;
pub use value::*;
