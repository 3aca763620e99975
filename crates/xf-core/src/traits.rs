//! Core traits for xsecfit
//!
//! These traits are the seams between the propagator core and its external
//! collaborators: the parameter store, the concrete dial subtypes
//! (spline/graph interpolation, normalization dials) and the per-bin
//! comparison statistic. High-level pipeline logic depends only on these
//! abstractions, never on concrete implementations.

use crate::Result;

/// Read-only handle to one continuous fit parameter.
///
/// The minimizer owns and mutates parameter values; dials only ever need
/// the current value, so this is all the capability they get.
pub trait ParameterView: Send + Sync {
    /// Parameter name (for diagnostics)
    fn name(&self) -> &str;

    /// Current parameter value
    fn current_value(&self) -> f64;
}

/// Subtype-specific dial response computation.
///
/// Given a parameter value, produce a finite multiplicative response.
/// The contract places no constraint on sign or magnitude, but an
/// implementation that cannot produce a valid number must return an
/// explicit error rather than a non-finite sentinel.
pub trait DialResponse: Send + Sync {
    /// Compute the response at `parameter_value`.
    fn response(&self, parameter_value: f64) -> Result<f64>;

    /// Response kind (e.g. "Spline", "Norm") for diagnostics.
    fn kind(&self) -> &str;
}

/// Per-bin comparison statistic.
///
/// A pure function combining the simulated prediction and the compared
/// data content of one bin into a fit-quality contribution; the sample
/// set sums it over all bins of all samples.
pub trait BinStatistic: Send + Sync {
    /// Evaluate the statistic for one bin.
    fn eval(&self, expected: f64, expected_error: f64, observed: f64) -> f64;

    /// Statistic name (e.g. "Poisson")
    fn name(&self) -> &str;
}
