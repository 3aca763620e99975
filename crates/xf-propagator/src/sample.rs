//! Samples: named analysis categories owning event collections,
//! histograms and bin-indexed event caches.
//!
//! A sample owns two event containers: the simulated collection (`mc`,
//! reweightable through dials) and the compared collection (`data`,
//! either real measurements or the frozen reference pseudo-dataset).
//! Containers carry everything the refill pipeline mutates per iteration:
//! the histogram, the per-bin event-index cache and the per-thread
//! partial sums.

use std::sync::{Mutex, RwLock};

use xf_core::{Error, Result};

use crate::binning::Bin;
use crate::event::EventRecord;
use crate::histogram::{BinErrorPolicy, Histogram, HistogramPartial};
use crate::parallel::{partition_range, ThreadContext};

/// Per-bin event-index lists, stamped with the bin-assignment generation
/// that produced them.
#[derive(Debug, Default)]
struct BinEventCache {
    per_bin: Vec<Vec<usize>>,
    /// Assignment generation the cache was built from; 0 = never built.
    generation: u64,
}

/// One event collection with its histogram and caches.
pub struct EventContainer {
    events: Vec<EventRecord>,
    /// Global normalization applied during rescale (e.g. exposure ratio).
    norm_scale: f64,
    histogram: Mutex<Histogram>,
    bin_event_cache: RwLock<BinEventCache>,
    partials: Mutex<Vec<HistogramPartial>>,
}

impl Default for EventContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            norm_scale: 1.0,
            histogram: Mutex::new(Histogram::default()),
            bin_event_cache: RwLock::new(BinEventCache::default()),
            partials: Mutex::new(Vec::new()),
        }
    }

    /// Replace the event list. Load-time only.
    pub fn set_events(&mut self, events: Vec<EventRecord>) {
        self.events = events;
    }

    /// Append one event. Load-time only.
    pub fn push_event(&mut self, event: EventRecord) {
        self.events.push(event);
    }

    /// Loaded events
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Mutable event access for the loading collaborator (dial
    /// attachment, weight setting).
    pub fn events_mut(&mut self) -> &mut [EventRecord] {
        &mut self.events
    }

    /// Number of loaded events
    pub fn n_events(&self) -> usize {
        self.events.len()
    }

    /// Set the rescale normalization factor.
    pub fn set_norm_scale(&mut self, scale: f64) {
        self.norm_scale = scale;
    }

    /// Rescale normalization factor
    pub fn norm_scale(&self) -> f64 {
        self.norm_scale
    }

    /// Snapshot of the container's histogram.
    pub fn histogram(&self) -> Histogram {
        self.histogram.lock().expect("histogram mutex poisoned").clone()
    }

    /// Generation stamp of the current bin-event cache (0 = never built).
    pub(crate) fn cache_generation(&self) -> u64 {
        self.bin_event_cache.read().expect("bin event cache lock poisoned").generation
    }

    /// Step 1 work: recompute the assigned bin index for this thread's
    /// slice of the event list.
    fn update_event_bin_indexes(&self, bins: &[Bin], ctx: ThreadContext) -> Result<()> {
        let range = partition_range(self.events.len(), ctx.thread_index, ctx.thread_count);
        for event in &self.events[range] {
            event.set_bin_index(event.assigned_bin(bins)?);
        }
        Ok(())
    }

    /// Step 2: rebuild the per-bin event-index lists from the freshly
    /// assigned indices and stamp them with `generation`. Events with no
    /// assigned bin are dropped from aggregation but stay in the event
    /// list. An index outside the sample's bin list is a fatal
    /// inconsistency.
    fn update_bin_event_list(&self, n_bins: usize, generation: u64, label: &str) -> Result<()> {
        let mut per_bin: Vec<Vec<usize>> = vec![Vec::new(); n_bins];
        for (i, event) in self.events.iter().enumerate() {
            if let Some(bin) = event.bin_index() {
                if bin >= n_bins {
                    return Err(Error::Validation(format!(
                        "{}: event {} assigned to bin {} but the sample has {} bins",
                        label, i, bin, n_bins
                    )));
                }
                per_bin[bin].push(i);
            }
        }

        let mut cache = self.bin_event_cache.write().expect("bin event cache lock poisoned");
        cache.per_bin = per_bin;
        cache.generation = generation;
        Ok(())
    }

    /// Step 3 work: sum `current_weight` over this thread's slice of
    /// bins into a fresh partial. Bin-partitioned, so no two threads
    /// ever touch the same bin; partials are merged serially in
    /// `rescale`.
    fn refill_partial(
        &self,
        ctx: ThreadContext,
        expected_generation: u64,
        label: &str,
    ) -> Result<()> {
        let cache = self.bin_event_cache.read().expect("bin event cache lock poisoned");
        if expected_generation == 0 {
            return Err(Error::Validation(format!(
                "{}: refill requested before any bin-index update pass",
                label
            )));
        }
        if cache.generation != expected_generation {
            return Err(Error::Validation(format!(
                "{}: bin event lists are stale (cache generation {}, bin assignment \
                 generation {}); run the update steps in order",
                label, cache.generation, expected_generation
            )));
        }

        let n_bins = cache.per_bin.len();
        let mut partial = HistogramPartial::new(n_bins);
        for bin in partition_range(n_bins, ctx.thread_index, ctx.thread_count) {
            for &event_index in &cache.per_bin[bin] {
                let weight = self.events[event_index].current_weight()?;
                partial.contents[bin] += weight;
                partial.sumw2[bin] += weight * weight;
                partial.entries += 1;
            }
        }

        self.partials.lock().expect("partials mutex poisoned").push(partial);
        Ok(())
    }

    /// Drop accumulated partials without touching the histogram, after a
    /// refill pass failed partway.
    fn discard_partials(&self) {
        self.partials.lock().expect("partials mutex poisoned").clear();
    }

    /// Step 3 post: merge the per-thread partials into the histogram,
    /// apply the normalization scale and compute per-bin errors.
    fn rescale(&self, n_bins: usize, policy: BinErrorPolicy) -> Result<()> {
        let mut histogram = Histogram::new(n_bins);
        {
            let mut partials = self.partials.lock().expect("partials mutex poisoned");
            for partial in partials.drain(..) {
                partial.merge_into(&mut histogram)?;
            }
        }

        if self.norm_scale != 1.0 {
            let scale = self.norm_scale;
            histogram.contents.iter_mut().for_each(|v| *v *= scale);
            histogram.sumw2.iter_mut().for_each(|v| *v *= scale * scale);
        }
        for bin in 0..n_bins {
            histogram.errors[bin] = policy.error(histogram.contents[bin], histogram.sumw2[bin]);
        }

        *self.histogram.lock().expect("histogram mutex poisoned") = histogram;
        Ok(())
    }
}

impl std::fmt::Debug for EventContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContainer")
            .field("n_events", &self.events.len())
            .field("norm_scale", &self.norm_scale)
            .finish()
    }
}

/// Named analysis category: bins, simulated and compared event
/// collections.
pub struct Sample {
    name: String,
    bins: Vec<Bin>,
    mc: EventContainer,
    data: EventContainer,
}

impl Sample {
    /// Create a sample over a non-empty bin list.
    pub fn new(name: impl Into<String>, bins: Vec<Bin>) -> Result<Self> {
        let name = name.into();
        if bins.is_empty() {
            return Err(Error::Config(format!("Sample '{}' has no bins", name)));
        }
        Ok(Self { name, bins, mc: EventContainer::new(), data: EventContainer::new() })
    }

    /// Sample name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bin list, in declaration order
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Simulated (reweightable) collection
    pub fn mc(&self) -> &EventContainer {
        &self.mc
    }

    /// Simulated collection, mutable. Load-time only.
    pub fn mc_mut(&mut self) -> &mut EventContainer {
        &mut self.mc
    }

    /// Compared collection (measurements or reference pseudo-dataset)
    pub fn data(&self) -> &EventContainer {
        &self.data
    }

    /// Compared collection, mutable. Load-time only.
    pub fn data_mut(&mut self) -> &mut EventContainer {
        &mut self.data
    }

    /// Build the reference pseudo-dataset: frozen copies of the MC
    /// events become the compared collection. Guarded: fails when the
    /// compared collection is already populated, so a second call can
    /// never append or duplicate.
    pub fn snapshot_reference_dataset(&mut self) -> Result<()> {
        if self.data.n_events() > 0 {
            return Err(Error::Validation(format!(
                "Can't snapshot reference dataset for sample '{}': the compared \
                 collection already holds {} events",
                self.name,
                self.data.n_events()
            )));
        }
        self.data.events = self.mc.events.iter().map(EventRecord::frozen_copy).collect();
        Ok(())
    }

    pub(crate) fn update_event_bin_indexes(&self, ctx: ThreadContext) -> Result<()> {
        self.mc.update_event_bin_indexes(&self.bins, ctx)?;
        self.data.update_event_bin_indexes(&self.bins, ctx)?;
        Ok(())
    }

    pub(crate) fn update_bin_event_lists(&self, generation: u64) -> Result<()> {
        let n_bins = self.bins.len();
        self.mc.update_bin_event_list(
            n_bins,
            generation,
            &format!("Sample '{}' mc container", self.name),
        )?;
        self.data.update_bin_event_list(
            n_bins,
            generation,
            &format!("Sample '{}' data container", self.name),
        )?;
        Ok(())
    }

    pub(crate) fn refill_partials(
        &self,
        ctx: ThreadContext,
        expected_generation: u64,
    ) -> Result<()> {
        self.mc.refill_partial(
            ctx,
            expected_generation,
            &format!("Sample '{}' mc container", self.name),
        )?;
        self.data.refill_partial(
            ctx,
            expected_generation,
            &format!("Sample '{}' data container", self.name),
        )?;
        Ok(())
    }

    pub(crate) fn rescale_histograms(&self, policy: BinErrorPolicy) -> Result<()> {
        self.mc.rescale(self.bins.len(), policy)?;
        self.data.rescale(self.bins.len(), policy)?;
        Ok(())
    }

    pub(crate) fn discard_partials(&self) {
        self.mc.discard_partials();
        self.data.discard_partials();
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("name", &self.name)
            .field("n_bins", &self.bins.len())
            .field("mc", &self.mc)
            .field("data", &self.data)
            .finish()
    }
}
