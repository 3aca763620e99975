//! xf-core: error types and cross-crate traits for the xsecfit propagator.

pub mod error;
pub mod traits;

pub use error::{Error, Result};
pub use traits::{BinStatistic, DialResponse, ParameterView};
