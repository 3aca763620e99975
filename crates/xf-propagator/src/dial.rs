//! Per-event systematic response cache.
//!
//! A `Dial` maps one continuous parameter value to a multiplicative
//! response. The subtype-specific computation (spline or graph
//! interpolation, flat normalization, ...) lives behind the
//! [`DialResponse`] trait; the dial itself only memoizes the last
//! `(parameter value, response)` pair. Many events can share one dial
//! instance (e.g. a dial scoped to a bin), so the cache is what keeps the
//! per-iteration reweight cheap: the first caller after a parameter move
//! recomputes, everyone else hits the cache.

use std::fmt;
use std::sync::{Arc, Mutex};

use xf_core::{DialResponse, Error, ParameterView, Result};

use crate::binning::Bin;
use crate::event::EventRecord;

/// Memoized `(parameter value, response)` pair.
///
/// Guarded as one unit by a mutex: a reader can never observe a value
/// paired with a stale response, and concurrent callers racing on a new
/// value block on the lock instead of recomputing redundantly.
#[derive(Debug, Clone, Copy)]
struct ResponseCache {
    parameter_value: f64,
    response: f64,
}

/// One systematic parameter's multiplicative effect on event weight.
pub struct Dial {
    label: String,
    response: Arc<dyn DialResponse>,
    parameter: Option<Arc<dyn ParameterView>>,
    apply_condition: Option<Bin>,
    cache: Mutex<Option<ResponseCache>>,
}

impl Dial {
    /// Create a dial from its response computation.
    ///
    /// There is no "unset type" state: a dial cannot exist without a
    /// response implementation.
    pub fn new(label: impl Into<String>, response: Arc<dyn DialResponse>) -> Self {
        Self {
            label: label.into(),
            response,
            parameter: None,
            apply_condition: None,
            cache: Mutex::new(None),
        }
    }

    /// Attach the parameter whose current value this dial tracks.
    pub fn with_parameter(mut self, parameter: Arc<dyn ParameterView>) -> Self {
        self.parameter = Some(parameter);
        self
    }

    /// Restrict the dial to events inside `bin`.
    pub fn with_apply_condition(mut self, bin: Bin) -> Self {
        self.apply_condition = Some(bin);
        self
    }

    /// Dial label (for diagnostics)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Response kind, as reported by the subtype.
    pub fn kind(&self) -> &str {
        self.response.kind()
    }

    /// The optional bin restricting which events this dial applies to.
    pub fn apply_condition(&self) -> Option<&Bin> {
        self.apply_condition.as_ref()
    }

    /// True when the dial applies to `event`: either no apply-condition
    /// bin is set, or the event lies inside it.
    pub fn applies_to(&self, event: &EventRecord) -> Result<bool> {
        match &self.apply_condition {
            Some(bin) => bin.contains(event),
            None => Ok(true),
        }
    }

    /// Evaluate the response at `parameter_value`.
    ///
    /// Returns the cached response when `parameter_value` equals the
    /// cached parameter value, without re-invoking the subtype
    /// computation. Otherwise recomputes, validates finiteness, stores
    /// the new pair and returns the response.
    pub fn evaluate(&self, parameter_value: f64) -> Result<f64> {
        let mut cache = self.cache.lock().expect("dial cache mutex poisoned");

        if let Some(cached) = *cache {
            if cached.parameter_value == parameter_value {
                return Ok(cached.response);
            }
        }

        let response = self.response.response(parameter_value)?;
        if !response.is_finite() {
            return Err(Error::Computation(format!(
                "Dial '{}' ({}) produced non-finite response {} at parameter value {}",
                self.label,
                self.response.kind(),
                response,
                parameter_value
            )));
        }

        *cache = Some(ResponseCache { parameter_value, response });
        Ok(response)
    }

    /// Evaluate at the attached parameter's current value.
    ///
    /// Fails with a configuration error when no parameter is attached.
    pub fn evaluate_current(&self) -> Result<f64> {
        let parameter = self.parameter.as_ref().ok_or_else(|| {
            Error::Config(format!("Dial '{}' has no associated parameter", self.label))
        })?;
        self.evaluate(parameter.current_value())
    }

    /// Last cached response, if any. For diagnostics and tests.
    pub fn cached_response(&self) -> Option<f64> {
        self.cache.lock().expect("dial cache mutex poisoned").map(|c| c.response)
    }
}

impl fmt::Debug for Dial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dial")
            .field("label", &self.label)
            .field("kind", &self.response.kind())
            .field("parameter", &self.parameter.as_ref().map(|p| p.name().to_string()))
            .field("apply_condition", &self.apply_condition.as_ref().map(|b| b.summary()))
            .field("cache", &*self.cache.lock().expect("dial cache mutex poisoned"))
            .finish()
    }
}
