//! Fit parameters.
//!
//! The minimizer owns the parameter values and mutates them between
//! likelihood evaluations; dials read them concurrently through the
//! [`ParameterView`] capability. The value lives in an atomic f64 cell so
//! neither side needs a lock. Dial caches are invalidated lazily, by
//! value comparison, never by an explicit signal.

use std::sync::atomic::{AtomicU64, Ordering};

use xf_core::ParameterView;

/// One continuous fit parameter: a name and a mutable current value.
#[derive(Debug)]
pub struct FitParameter {
    name: String,
    value_bits: AtomicU64,
}

impl FitParameter {
    /// Create a parameter at its initial value.
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self { name: name.into(), value_bits: AtomicU64::new(initial.to_bits()) }
    }

    /// Set the current value (minimizer side).
    pub fn set_value(&self, value: f64) {
        self.value_bits.store(value.to_bits(), Ordering::Release);
    }
}

impl ParameterView for FitParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_value(&self) -> f64 {
        f64::from_bits(self.value_bits.load(Ordering::Acquire))
    }
}
