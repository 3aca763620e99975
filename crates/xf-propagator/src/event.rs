//! Event records and their shared variable sets.
//!
//! One `EventRecord` is one simulated or measured interaction. Events are
//! created once by the data-loading collaborator and persist for the
//! fit's lifetime; across iterations only their assigned bin index and
//! (through the dials) their current weight change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use xf_core::{Error, Result};

use crate::binning::Bin;
use crate::dial::Dial;

/// Bin-index sentinel for "matched no bin".
const UNASSIGNED_BIN: i64 = -1;

/// Ordered variable-name list shared by all events of one dataset.
///
/// The name → index map is built once; lookups after that are O(1) and
/// events store only their value vector.
#[derive(Debug)]
pub struct VariableSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl VariableSet {
    /// Build the set from an ordered name list. Duplicate names are a
    /// configuration error.
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::Config(format!(
                    "Duplicate variable name '{}' in variable set",
                    name
                )));
            }
        }
        Ok(Self { names, index })
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Declared variable names, in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Resolve a variable name to its index.
    ///
    /// An unknown name is a fatal configuration error; the message lists
    /// the available names to make the schema mismatch obvious.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| {
            Error::Config(format!(
                "Could not find variable '{}'. Available variables: {:?}",
                name, self.names
            ))
        })
    }
}

/// Ordered dial list applying to one event for one systematic parameter
/// set.
#[derive(Debug, Clone)]
pub struct DialGroup {
    /// Owning parameter-set name
    pub parameter_set: String,
    /// Dials, in attachment order
    pub dials: Vec<Arc<Dial>>,
}

/// One simulated or measured interaction.
pub struct EventRecord {
    variables: Arc<VariableSet>,
    values: Vec<f64>,
    dataset_index: usize,
    entry_index: u64,
    base_weight: f64,
    nominal_weight: f64,
    bin_index: AtomicI64,
    dial_groups: Vec<DialGroup>,
}

impl EventRecord {
    /// Create an event from its dataset's variable set and value vector.
    pub fn new(variables: Arc<VariableSet>, values: Vec<f64>) -> Result<Self> {
        if values.len() != variables.len() {
            return Err(Error::Validation(format!(
                "Event value count mismatch: expected {} (variable set), got {}",
                variables.len(),
                values.len()
            )));
        }
        Ok(Self {
            variables,
            values,
            dataset_index: 0,
            entry_index: 0,
            base_weight: 1.0,
            nominal_weight: 1.0,
            bin_index: AtomicI64::new(UNASSIGNED_BIN),
            dial_groups: Vec::new(),
        })
    }

    /// Set provenance: owning dataset index and source-entry index.
    pub fn set_provenance(&mut self, dataset_index: usize, entry_index: u64) {
        self.dataset_index = dataset_index;
        self.entry_index = entry_index;
    }

    /// Owning dataset index
    pub fn dataset_index(&self) -> usize {
        self.dataset_index
    }

    /// Source-entry index (provenance only)
    pub fn entry_index(&self) -> u64 {
        self.entry_index
    }

    /// Set the generation/selection weight.
    pub fn set_base_weight(&mut self, weight: f64) {
        self.base_weight = weight;
    }

    /// Generation/selection weight
    pub fn base_weight(&self) -> f64 {
        self.base_weight
    }

    /// Set the baseline-corrected weight.
    pub fn set_nominal_weight(&mut self, weight: f64) {
        self.nominal_weight = weight;
    }

    /// Baseline-corrected weight
    pub fn nominal_weight(&self) -> f64 {
        self.nominal_weight
    }

    /// The dataset's variable set.
    pub fn variables(&self) -> &Arc<VariableSet> {
        &self.variables
    }

    /// Value of the variable `name`.
    pub fn value(&self, name: &str) -> Result<f64> {
        self.variables.index_of(name).map(|i| self.values[i])
    }

    /// Value at a pre-resolved variable index.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        self.values.get(index).copied().ok_or_else(|| {
            Error::Validation(format!(
                "Variable index {} out of range for event with {} values",
                index,
                self.values.len()
            ))
        })
    }

    /// Currently assigned bin index, `None` when the event matched no bin
    /// or no assignment pass has run yet.
    pub fn bin_index(&self) -> Option<usize> {
        match self.bin_index.load(Ordering::Acquire) {
            UNASSIGNED_BIN => None,
            idx => Some(idx as usize),
        }
    }

    /// Store the assigned bin index. Takes `&self`: the cell is atomic so
    /// the parallel assignment pass can write through a shared reference.
    pub fn set_bin_index(&self, index: Option<usize>) {
        let raw = index.map(|i| i as i64).unwrap_or(UNASSIGNED_BIN);
        self.bin_index.store(raw, Ordering::Release);
    }

    /// Find the bin containing this event: linear scan of `bins` in
    /// declaration order, first match wins, `None` if no bin matches.
    ///
    /// Overlapping bins are not rejected; declaration order is the
    /// tie-breaker.
    pub fn assigned_bin(&self, bins: &[Bin]) -> Result<Option<usize>> {
        for (i, bin) in bins.iter().enumerate() {
            if bin.contains(self)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Attach a dial for `parameter_set`, respecting the dial's
    /// apply-condition bin. Returns whether the dial was attached.
    /// Load-time only.
    pub fn attach_dial(&mut self, parameter_set: &str, dial: Arc<Dial>) -> Result<bool> {
        if !dial.applies_to(self)? {
            return Ok(false);
        }
        match self.dial_groups.iter_mut().find(|g| g.parameter_set == parameter_set) {
            Some(group) => group.dials.push(dial),
            None => self.dial_groups.push(DialGroup {
                parameter_set: parameter_set.to_string(),
                dials: vec![dial],
            }),
        }
        Ok(true)
    }

    /// Attached dial groups, one per parameter set.
    pub fn dial_groups(&self) -> &[DialGroup] {
        &self.dial_groups
    }

    /// Current weight: base weight × product of every attached dial's
    /// memoized response at its parameter's current value. Recomputed on
    /// demand; only the dials themselves cache.
    pub fn current_weight(&self) -> Result<f64> {
        let mut weight = self.base_weight;
        for group in &self.dial_groups {
            for dial in &group.dials {
                weight *= dial.evaluate_current()?;
            }
        }
        Ok(weight)
    }

    /// Independent frozen copy for the reference pseudo-dataset: the
    /// nominal weight becomes the base weight and dial groups are dropped,
    /// so the copy never reweights.
    pub fn frozen_copy(&self) -> Self {
        Self {
            variables: Arc::clone(&self.variables),
            values: self.values.clone(),
            dataset_index: self.dataset_index,
            entry_index: self.entry_index,
            base_weight: self.nominal_weight,
            nominal_weight: self.nominal_weight,
            bin_index: AtomicI64::new(self.bin_index.load(Ordering::Acquire)),
            dial_groups: Vec::new(),
        }
    }
}

impl Clone for EventRecord {
    fn clone(&self) -> Self {
        Self {
            variables: Arc::clone(&self.variables),
            values: self.values.clone(),
            dataset_index: self.dataset_index,
            entry_index: self.entry_index,
            base_weight: self.base_weight,
            nominal_weight: self.nominal_weight,
            bin_index: AtomicI64::new(self.bin_index.load(Ordering::Acquire)),
            dial_groups: self.dial_groups.clone(),
        }
    }
}

impl std::fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("dataset_index", &self.dataset_index)
            .field("entry_index", &self.entry_index)
            .field("base_weight", &self.base_weight)
            .field("nominal_weight", &self.nominal_weight)
            .field("bin_index", &self.bin_index())
            .field("n_dial_groups", &self.dial_groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{bins_from_axis, Bin, BinEdges};
    use crate::param::FitParameter;
    use xf_core::{DialResponse, ParameterView};

    struct LinearResponse;

    impl DialResponse for LinearResponse {
        fn response(&self, parameter_value: f64) -> Result<f64> {
            Ok(1.0 + parameter_value)
        }

        fn kind(&self) -> &str {
            "Linear"
        }
    }

    fn vars() -> Arc<VariableSet> {
        Arc::new(VariableSet::new(vec!["enu_reco".into(), "q2_reco".into()]).unwrap())
    }

    #[test]
    fn variable_set_rejects_duplicates() {
        let err = VariableSet::new(vec!["x".into(), "x".into()]).unwrap_err();
        assert!(err.to_string().contains("Duplicate variable name 'x'"));
    }

    #[test]
    fn variable_lookup_by_name_and_index() {
        let ev = EventRecord::new(vars(), vec![0.6, 0.1]).unwrap();
        assert_eq!(ev.value("enu_reco").unwrap(), 0.6);
        let idx = ev.variables().index_of("q2_reco").unwrap();
        assert_eq!(ev.value_at(idx).unwrap(), 0.1);
    }

    #[test]
    fn unknown_variable_lists_available_names() {
        let ev = EventRecord::new(vars(), vec![0.6, 0.1]).unwrap();
        let msg = ev.value("pmu_reco").unwrap_err().to_string();
        assert!(msg.contains("pmu_reco"));
        assert!(msg.contains("enu_reco"));
    }

    #[test]
    fn value_count_mismatch_rejected() {
        let err = EventRecord::new(vars(), vec![0.6]).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn assigned_bin_first_match_wins() {
        let ev = EventRecord::new(vars(), vec![0.5, 0.1]).unwrap();
        // Overlapping bins: declaration order breaks the tie.
        let wide = Bin::new(vec![BinEdges {
            variable: "enu_reco".into(),
            low: 0.0,
            high: 10.0,
            include_high: true,
        }]);
        let narrow = Bin::new(vec![BinEdges {
            variable: "enu_reco".into(),
            low: 0.0,
            high: 1.0,
            include_high: false,
        }]);
        assert_eq!(ev.assigned_bin(&[wide.clone(), narrow.clone()]).unwrap(), Some(0));
        assert_eq!(ev.assigned_bin(&[narrow, wide]).unwrap(), Some(0));
    }

    #[test]
    fn assigned_bin_deterministic_and_none_when_unmatched() {
        let ev = EventRecord::new(vars(), vec![25.0, 0.1]).unwrap();
        let bins = bins_from_axis("enu_reco", &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(ev.assigned_bin(&bins).unwrap(), None);
        assert_eq!(ev.assigned_bin(&bins).unwrap(), None);
        assert_eq!(ev.bin_index(), None);
    }

    #[test]
    fn current_weight_composes_dial_responses() {
        let p1 = Arc::new(FitParameter::new("a", 1.0));
        let p2 = Arc::new(FitParameter::new("b", 0.0));
        let d1 = Arc::new(
            Dial::new("dial_a", Arc::new(LinearResponse) as Arc<dyn DialResponse>)
                .with_parameter(Arc::clone(&p1) as Arc<dyn ParameterView>),
        );
        let d2 = Arc::new(
            Dial::new("dial_b", Arc::new(LinearResponse) as Arc<dyn DialResponse>)
                .with_parameter(Arc::clone(&p2) as Arc<dyn ParameterView>),
        );

        let mut ev = EventRecord::new(vars(), vec![0.5, 0.1]).unwrap();
        ev.set_base_weight(3.0);
        assert!(ev.attach_dial("flux", d1).unwrap());
        assert!(ev.attach_dial("xsec", d2).unwrap());

        // 3.0 * (1 + 1.0) * (1 + 0.0)
        assert_eq!(ev.current_weight().unwrap(), 6.0);

        // Moving one parameter changes only that dial's factor.
        p2.set_value(1.0);
        assert_eq!(ev.current_weight().unwrap(), 12.0);
        p2.set_value(0.0);
        assert_eq!(ev.current_weight().unwrap(), 6.0);
    }

    #[test]
    fn attach_dial_respects_apply_condition() {
        let bin = Bin::new(vec![BinEdges {
            variable: "enu_reco".into(),
            low: 5.0,
            high: 10.0,
            include_high: false,
        }]);
        let dial = Arc::new(
            Dial::new("scoped", Arc::new(LinearResponse) as Arc<dyn DialResponse>)
                .with_apply_condition(bin),
        );

        let mut ev = EventRecord::new(vars(), vec![0.5, 0.1]).unwrap();
        assert!(!ev.attach_dial("flux", dial).unwrap());
        assert!(ev.dial_groups().is_empty());
    }

    #[test]
    fn frozen_copy_drops_dials_and_freezes_nominal_weight() {
        let p = Arc::new(FitParameter::new("a", 1.0));
        let dial = Arc::new(
            Dial::new("dial_a", Arc::new(LinearResponse) as Arc<dyn DialResponse>)
                .with_parameter(p as Arc<dyn ParameterView>),
        );

        let mut ev = EventRecord::new(vars(), vec![0.5, 0.1]).unwrap();
        ev.set_base_weight(2.0);
        ev.set_nominal_weight(2.5);
        ev.attach_dial("flux", dial).unwrap();
        ev.set_bin_index(Some(3));

        let frozen = ev.frozen_copy();
        assert_eq!(frozen.base_weight(), 2.5);
        assert!(frozen.dial_groups().is_empty());
        assert_eq!(frozen.bin_index(), Some(3));
        assert_eq!(frozen.current_weight().unwrap(), 2.5);
    }
}
