//! Per-bin comparison statistics.
//!
//! The sample set consumes any [`BinStatistic`]; the two shipped here are
//! the plain per-bin Poisson negative log-likelihood and the
//! Barlow-Beeston-lite variant that folds the MC statistical error into
//! the bin term.

use statrs::function::gamma::ln_gamma;
use xf_core::{BinStatistic, Error, Result};

/// Floor for expected bin contents, so empty predictions stay finite.
const MIN_EXPECTED: f64 = 1e-10;

/// Compute `ln Γ(n+1)` (generalized factorial).
fn ln_factorial(n: f64) -> f64 {
    ln_gamma(n + 1.0)
}

/// Per-bin Poisson negative log-likelihood:
/// `exp - obs·ln(exp) + ln Γ(obs+1)`, with `exp` clamped to a small
/// positive floor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonLlh;

impl BinStatistic for PoissonLlh {
    fn eval(&self, expected: f64, _expected_error: f64, observed: f64) -> f64 {
        let exp = expected.max(MIN_EXPECTED);
        if observed > 0.0 {
            exp - observed * exp.ln() + ln_factorial(observed)
        } else {
            exp
        }
    }

    fn name(&self) -> &str {
        "Poisson"
    }
}

/// Barlow-Beeston-lite per-bin likelihood.
///
/// Profiles a single scale `beta` over the bin prediction, constrained by
/// the MC statistical error: with relative variance
/// `sigma2 = (err/exp)^2`, the stationary point solves
/// `beta^2 + (exp·sigma2 - 1)·beta - obs·sigma2 = 0`, and the bin term is
/// the Poisson NLL at `beta·exp` plus the Gaussian penalty
/// `(beta - 1)^2 / (2·sigma2)`. Reduces to [`PoissonLlh`] as the MC
/// error vanishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarlowBeestonLlh;

impl BinStatistic for BarlowBeestonLlh {
    fn eval(&self, expected: f64, expected_error: f64, observed: f64) -> f64 {
        let exp = expected.max(MIN_EXPECTED);
        let sigma2 = (expected_error * expected_error) / (exp * exp);
        if sigma2 <= 0.0 {
            return PoissonLlh.eval(expected, expected_error, observed);
        }

        let b = exp * sigma2 - 1.0;
        let beta = (-b + (b * b + 4.0 * observed * sigma2).sqrt()) / 2.0;
        let scaled = (beta * exp).max(MIN_EXPECTED);

        let poisson = if observed > 0.0 {
            scaled - observed * scaled.ln() + ln_factorial(observed)
        } else {
            scaled
        };
        poisson + (beta - 1.0) * (beta - 1.0) / (2.0 * sigma2)
    }

    fn name(&self) -> &str {
        "BarlowBeeston"
    }
}

/// Resolve a configured statistic name. Unknown names are a fatal
/// configuration error.
pub fn from_name(name: &str) -> Result<Box<dyn BinStatistic>> {
    match name {
        "Poisson" | "PoissonLLH" => Ok(Box::new(PoissonLlh)),
        "BarlowBeeston" | "BarlowLLH" => Ok(Box::new(BarlowBeestonLlh)),
        other => Err(Error::Config(format!(
            "Unknown comparison statistic '{}'. Expecting one of: Poisson, BarlowBeeston",
            other
        ))),
    }
}
