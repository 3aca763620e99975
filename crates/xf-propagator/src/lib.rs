//! # xf-propagator
//!
//! Event propagation core for binned cross-section fits.
//!
//! This crate turns a point in parameter space into a likelihood value:
//! events carry dial responses tied to fit parameters, samples bin the
//! reweighted events into histograms, and the sample set runs the fixed
//! four-step pipeline (bin indexes, bin event lists, histogram refill,
//! likelihood reduction) across a reusable thread pool.
//!
//! Statistical comparison is pluggable through the `BinStatistic` trait
//! from `xf-core`; Poisson and Barlow-Beeston-lite implementations ship
//! in [`stat`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Bin definitions: per-variable edge ranges and axis helpers.
pub mod binning;
/// Parameter-dependent event-weight responses with memoized evaluation.
pub mod dial;
/// Event records: variable values, provenance, weights, dial groups.
pub mod event;
/// Histogram storage, per-thread partials and the bin-error policy.
pub mod histogram;
/// Fit parameters readable concurrently through `ParameterView`.
pub mod param;
/// Named-job scheduler over a fixed rayon pool.
pub mod parallel;
/// Samples: bins plus simulated and compared event collections.
pub mod sample;
/// The sample set and its propagation pipeline.
pub mod sample_set;
/// Per-bin comparison statistics.
pub mod stat;

pub use binning::{bins_from_axis, bins_from_json, Bin, BinEdges};
pub use dial::Dial;
pub use event::{DialGroup, EventRecord, VariableSet};
pub use histogram::{BinErrorPolicy, Histogram};
pub use param::FitParameter;
pub use parallel::{ParallelWorker, ThreadContext};
pub use sample::{EventContainer, Sample};
pub use sample_set::SampleSet;
pub use stat::{BarlowBeestonLlh, PoissonLlh};
