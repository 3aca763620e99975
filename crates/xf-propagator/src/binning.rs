//! Bin definitions and membership tests.
//!
//! A bin is an axis-aligned region over named event variables. Bin lists
//! are declared by the external configuration layer; the types here are
//! serde-deserializable so that layer can build them straight from JSON.

use serde::{Deserialize, Serialize};
use xf_core::{Error, Result};

use crate::event::EventRecord;

/// Interval constraint on one named event variable.
///
/// Low edge inclusive, high edge exclusive, unless `include_high` is set
/// (the outermost bin of an axis, so the maximum value is admitted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    /// Constrained variable name
    pub variable: String,
    /// Lower edge (inclusive)
    pub low: f64,
    /// Upper edge (exclusive unless `include_high`)
    pub high: f64,
    /// Whether the upper edge is inclusive
    #[serde(default)]
    pub include_high: bool,
}

impl BinEdges {
    fn admits(&self, value: f64) -> bool {
        if value < self.low {
            return false;
        }
        if self.include_high {
            value <= self.high
        } else {
            value < self.high
        }
    }
}

/// Axis-aligned region of variable space defining one histogram slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Per-variable interval constraints, all of which must hold
    pub edges: Vec<BinEdges>,
}

impl Bin {
    /// Create a bin from its edge list.
    pub fn new(edges: Vec<BinEdges>) -> Self {
        Self { edges }
    }

    /// Membership test: true iff the event's value for every constrained
    /// variable lies within that variable's interval.
    ///
    /// An unknown variable name is a fatal configuration error (schema
    /// mismatch between the bin definition and the event's variable set).
    pub fn contains(&self, event: &EventRecord) -> Result<bool> {
        for edge in &self.edges {
            if !edge.admits(event.value(&edge.variable)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Human-readable summary, e.g. `x in [0, 1) and y in [0, 5]`.
    pub fn summary(&self) -> String {
        if self.edges.is_empty() {
            return "<no edges>".to_string();
        }
        self.edges
            .iter()
            .map(|e| {
                let close = if e.include_high { ']' } else { ')' };
                format!("{} in [{}, {}{}", e.variable, e.low, e.high, close)
            })
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

/// Build a one-dimensional bin list over `variable` from a sorted edge
/// array of length `n_bins + 1`. The last bin gets an inclusive upper
/// edge.
pub fn bins_from_axis(variable: &str, edges: &[f64]) -> Result<Vec<Bin>> {
    if edges.len() < 2 {
        return Err(Error::Config(format!(
            "Axis '{}' needs at least 2 edges, got {}",
            variable,
            edges.len()
        )));
    }
    for pair in edges.windows(2) {
        if pair[1] <= pair[0] {
            return Err(Error::Config(format!(
                "Axis '{}' edges not strictly increasing: {} then {}",
                variable, pair[0], pair[1]
            )));
        }
    }

    let n_bins = edges.len() - 1;
    Ok((0..n_bins)
        .map(|i| {
            Bin::new(vec![BinEdges {
                variable: variable.to_string(),
                low: edges[i],
                high: edges[i + 1],
                include_high: i == n_bins - 1,
            }])
        })
        .collect())
}

/// Parse a bin list from its JSON representation.
pub fn bins_from_json(json: &str) -> Result<Vec<Bin>> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::VariableSet;
    use std::sync::Arc;

    fn event(x: f64, y: f64) -> EventRecord {
        let vars = Arc::new(VariableSet::new(vec!["x".into(), "y".into()]).unwrap());
        EventRecord::new(vars, vec![x, y]).unwrap()
    }

    #[test]
    fn edges_half_open() {
        let e = BinEdges { variable: "x".into(), low: 0.0, high: 1.0, include_high: false };
        assert!(e.admits(0.0));
        assert!(e.admits(0.999));
        assert!(!e.admits(1.0));
        assert!(!e.admits(-0.1));
    }

    #[test]
    fn edges_inclusive_high() {
        let e = BinEdges { variable: "x".into(), low: 1.0, high: 2.0, include_high: true };
        assert!(e.admits(2.0));
        assert!(!e.admits(2.0001));
    }

    #[test]
    fn contains_all_constraints_must_hold() {
        let bin = Bin::new(vec![
            BinEdges { variable: "x".into(), low: 0.0, high: 1.0, include_high: false },
            BinEdges { variable: "y".into(), low: 0.0, high: 5.0, include_high: false },
        ]);
        assert!(bin.contains(&event(0.5, 2.0)).unwrap());
        assert!(!bin.contains(&event(0.5, 6.0)).unwrap());
        assert!(!bin.contains(&event(1.5, 2.0)).unwrap());
    }

    #[test]
    fn contains_unknown_variable_is_config_error() {
        let bin = Bin::new(vec![BinEdges {
            variable: "enu_reco".into(),
            low: 0.0,
            high: 1.0,
            include_high: false,
        }]);
        let err = bin.contains(&event(0.5, 2.0)).unwrap_err();
        assert!(err.to_string().contains("enu_reco"));
    }

    #[test]
    fn axis_builder_marks_last_bin_inclusive() {
        let bins = bins_from_axis("x", &[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(bins.len(), 3);
        assert!(!bins[0].edges[0].include_high);
        assert!(!bins[1].edges[0].include_high);
        assert!(bins[2].edges[0].include_high);
        assert!(bins[2].contains(&event(3.0, 0.0)).unwrap());
    }

    #[test]
    fn axis_builder_rejects_unsorted_edges() {
        let err = bins_from_axis("x", &[0.0, 2.0, 1.0]).unwrap_err();
        assert!(err.to_string().contains("increasing"));
    }

    #[test]
    fn bins_parse_from_json() {
        let json = r#"[
            {"edges": [{"variable": "x", "low": 0.0, "high": 1.0}]},
            {"edges": [{"variable": "x", "low": 1.0, "high": 2.0, "include_high": true}]}
        ]"#;
        let bins = bins_from_json(json).unwrap();
        assert_eq!(bins.len(), 2);
        assert!(!bins[0].edges[0].include_high);
        assert!(bins[1].edges[0].include_high);
    }

    #[test]
    fn summary_format() {
        let bin = Bin::new(vec![BinEdges {
            variable: "x".into(),
            low: 0.0,
            high: 1.0,
            include_high: true,
        }]);
        assert_eq!(bin.summary(), "x in [0, 1]");
    }
}
