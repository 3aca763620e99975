//! Sample set: owns the samples, the worker pool and the fixed
//! propagation pipeline.
//!
//! One fit iteration is four steps, always in this order:
//!
//! 1. `update_event_bin_indexes` recomputes every event's bin index.
//! 2. `update_bin_event_lists` rebuilds the per-bin event caches.
//! 3. `update_histograms` refills the histograms from the caches and
//!    rescales them in a serial post step.
//! 4. `reduce_likelihood` folds the per-bin comparison statistic over
//!    every sample.
//!
//! [`SampleSet::evaluate`] runs all four. The steps are also exposed
//! individually so a minimizer that knows parameters only changed event
//! weights can skip the first two; running them out of order is detected
//! through the assignment generation stamp and surfaces as an `Err`
//! rather than silent stale contents.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use xf_core::{BinStatistic, Error, Result};

use crate::histogram::BinErrorPolicy;
use crate::parallel::{partition_range, JobErrorSlot, ParallelWorker};
use crate::sample::Sample;

const JOB_UPDATE_BIN_INDEXES: &str = "sample_set::update_bin_indexes";
const JOB_UPDATE_BIN_EVENT_LISTS: &str = "sample_set::update_bin_event_lists";
const JOB_REFILL_HISTOGRAMS: &str = "sample_set::refill_histograms";

/// The full collection of samples plus everything needed to turn a
/// parameter point into a likelihood value.
pub struct SampleSet {
    samples: Arc<Vec<Sample>>,
    statistic: Arc<dyn BinStatistic>,
    error_policy: BinErrorPolicy,
    worker: ParallelWorker,
    /// Bumped after every successful bin-index pass; step 2 stamps the
    /// caches with it and step 3 refuses stale stamps.
    assign_generation: Arc<AtomicU64>,
    job_error: Arc<JobErrorSlot>,
}

impl SampleSet {
    /// Build the set, its thread pool and its three named jobs. Samples
    /// must be non-empty with unique names.
    pub fn new(
        samples: Vec<Sample>,
        statistic: Arc<dyn BinStatistic>,
        error_policy: BinErrorPolicy,
        thread_count: usize,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Config("Sample set has no samples".to_string()));
        }
        for (i, sample) in samples.iter().enumerate() {
            if samples[..i].iter().any(|other| other.name() == sample.name()) {
                return Err(Error::Config(format!(
                    "Duplicate sample name '{}'",
                    sample.name()
                )));
            }
        }

        let samples = Arc::new(samples);
        let assign_generation = Arc::new(AtomicU64::new(0));
        let job_error = Arc::new(JobErrorSlot::default());
        let mut worker = ParallelWorker::new(thread_count)?;

        // Step 1: every thread walks its slice of every sample's events.
        {
            let samples = Arc::clone(&samples);
            let errors = Arc::clone(&job_error);
            worker.register(JOB_UPDATE_BIN_INDEXES, move |ctx| {
                for sample in samples.iter() {
                    if let Err(err) = sample.update_event_bin_indexes(ctx) {
                        errors.record(err);
                        return;
                    }
                }
            })?;
        }

        // Step 2: samples are partitioned across threads; each cache is
        // rebuilt by exactly one thread.
        {
            let samples = Arc::clone(&samples);
            let errors = Arc::clone(&job_error);
            let generation = Arc::clone(&assign_generation);
            worker.register(JOB_UPDATE_BIN_EVENT_LISTS, move |ctx| {
                let range =
                    partition_range(samples.len(), ctx.thread_index, ctx.thread_count);
                let stamp = generation.load(Ordering::Acquire);
                for sample in &samples[range] {
                    if let Err(err) = sample.update_bin_event_lists(stamp) {
                        errors.record(err);
                        return;
                    }
                }
            })?;
        }

        // Step 3: bin-partitioned weight sums, then a serial rescale.
        {
            let samples_refill = Arc::clone(&samples);
            let errors = Arc::clone(&job_error);
            let generation = Arc::clone(&assign_generation);
            worker.register(JOB_REFILL_HISTOGRAMS, move |ctx| {
                let expected = generation.load(Ordering::Acquire);
                for sample in samples_refill.iter() {
                    if let Err(err) = sample.refill_partials(ctx, expected) {
                        errors.record(err);
                        return;
                    }
                }
            })?;
            let samples_rescale = Arc::clone(&samples);
            let errors = Arc::clone(&job_error);
            worker.set_post_work(JOB_REFILL_HISTOGRAMS, move || {
                // A failed refill keeps the previous histograms intact;
                // stray partials must not leak into the next pass.
                if errors.is_set() {
                    for sample in samples_rescale.iter() {
                        sample.discard_partials();
                    }
                    return;
                }
                for sample in samples_rescale.iter() {
                    if let Err(err) = sample.rescale_histograms(error_policy) {
                        errors.record(err);
                        return;
                    }
                }
            })?;
        }

        info!(
            n_samples = samples.len(),
            threads = worker.thread_count(),
            statistic = statistic.name(),
            "sample set ready"
        );

        Ok(Self { samples, statistic, error_policy, worker, assign_generation, job_error })
    }

    /// Samples, in declaration order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Look up a sample by name.
    pub fn sample(&self, name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.name() == name)
    }

    /// Active per-bin statistic
    pub fn statistic(&self) -> &dyn BinStatistic {
        self.statistic.as_ref()
    }

    /// Active per-bin error policy
    pub fn error_policy(&self) -> BinErrorPolicy {
        self.error_policy
    }

    fn run_job(&self, name: &str) -> Result<()> {
        let start = Instant::now();
        self.worker.run(name)?;
        self.job_error.take()?;
        debug!(job = name, elapsed = ?start.elapsed(), "job done");
        Ok(())
    }

    /// Pipeline step 1: recompute every event's bin index from its
    /// current variable values.
    pub fn update_event_bin_indexes(&self) -> Result<()> {
        self.run_job(JOB_UPDATE_BIN_INDEXES)?;
        self.assign_generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Pipeline step 2: rebuild the per-bin event caches from the
    /// freshly assigned indices.
    pub fn update_bin_event_lists(&self) -> Result<()> {
        self.run_job(JOB_UPDATE_BIN_EVENT_LISTS)
    }

    /// Pipeline step 3: refill every histogram from the caches, then
    /// rescale and recompute bin errors serially.
    pub fn update_histograms(&self) -> Result<()> {
        self.run_job(JOB_REFILL_HISTOGRAMS)
    }

    /// Pipeline step 4: fold the per-bin statistic over every sample,
    /// comparing the simulated histogram against the compared one.
    pub fn reduce_likelihood(&self) -> Result<f64> {
        let mut total = 0.0;
        for sample in self.samples.iter() {
            let mc = sample.mc().histogram();
            let data = sample.data().histogram();
            let n_bins = sample.bins().len();
            if mc.n_bins() != n_bins || data.n_bins() != n_bins {
                return Err(Error::Validation(format!(
                    "Sample '{}': histograms not filled ({} mc bins, {} data bins, \
                     {} expected); run the refill step first",
                    sample.name(),
                    mc.n_bins(),
                    data.n_bins(),
                    n_bins
                )));
            }
            for bin in 0..n_bins {
                total += self.statistic.eval(
                    mc.contents[bin],
                    mc.errors[bin],
                    data.contents[bin],
                );
            }
        }
        if !total.is_finite() {
            return Err(Error::Computation(format!(
                "Likelihood is not finite ({})",
                total
            )));
        }
        Ok(total)
    }

    /// Run the full pipeline for the current parameter values and return
    /// the likelihood.
    pub fn evaluate(&self) -> Result<f64> {
        self.update_event_bin_indexes()?;
        self.update_bin_event_lists()?;
        self.update_histograms()?;
        self.reduce_likelihood()
    }
}

impl std::fmt::Debug for SampleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSet")
            .field("n_samples", &self.samples.len())
            .field("statistic", &self.statistic.name())
            .field("error_policy", &self.error_policy)
            .field("threads", &self.worker.thread_count())
            .finish()
    }
}
