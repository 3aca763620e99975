//! Binned histogram storage and the per-bin statistical-error policy.

use serde::{Deserialize, Serialize};
use xf_core::{Error, Result};

/// One content + one statistical-error value per bin, with the sum of
/// squared weights kept alongside for the error computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    /// Sum of weights per bin
    pub contents: Vec<f64>,
    /// Sum of squared weights per bin
    pub sumw2: Vec<f64>,
    /// Statistical error per bin (filled during rescale)
    pub errors: Vec<f64>,
    /// Number of entries summed in
    pub entries: u64,
}

impl Histogram {
    /// Create an empty histogram with `n_bins` bins.
    pub fn new(n_bins: usize) -> Self {
        Self {
            contents: vec![0.0; n_bins],
            sumw2: vec![0.0; n_bins],
            errors: vec![0.0; n_bins],
            entries: 0,
        }
    }

    /// Number of bins
    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    /// Zero all contents, keeping the binning.
    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|v| *v = 0.0);
        self.sumw2.iter_mut().for_each(|v| *v = 0.0);
        self.errors.iter_mut().for_each(|v| *v = 0.0);
        self.entries = 0;
    }

    /// Total content across bins.
    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }
}

/// Per-thread partial accumulation, merged serially during rescale.
///
/// Partials are bin-partitioned across threads, so any given bin is only
/// ever non-zero in one partial per pass.
#[derive(Debug, Clone)]
pub(crate) struct HistogramPartial {
    pub contents: Vec<f64>,
    pub sumw2: Vec<f64>,
    pub entries: u64,
}

impl HistogramPartial {
    pub fn new(n_bins: usize) -> Self {
        Self { contents: vec![0.0; n_bins], sumw2: vec![0.0; n_bins], entries: 0 }
    }

    /// Fold this partial into `histogram`.
    pub fn merge_into(&self, histogram: &mut Histogram) -> Result<()> {
        if self.contents.len() != histogram.n_bins() {
            return Err(Error::Validation(format!(
                "Histogram partial bin count mismatch: partial {}, histogram {}",
                self.contents.len(),
                histogram.n_bins()
            )));
        }
        for (slot, v) in histogram.contents.iter_mut().zip(&self.contents) {
            *slot += v;
        }
        for (slot, v) in histogram.sumw2.iter_mut().zip(&self.sumw2) {
            *slot += v;
        }
        histogram.entries += self.entries;
        Ok(())
    }
}

/// Pluggable per-bin statistical-error model applied during rescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinErrorPolicy {
    /// √(Σw²), consistent with weighted filling. Default.
    SumWeightsSquared,
    /// √N on the accumulated content (simple Poisson).
    PoissonSqrtContent,
}

impl Default for BinErrorPolicy {
    fn default() -> Self {
        Self::SumWeightsSquared
    }
}

impl BinErrorPolicy {
    /// Statistical error for one bin.
    pub fn error(&self, content: f64, sumw2: f64) -> f64 {
        match self {
            Self::SumWeightsSquared => sumw2.max(0.0).sqrt(),
            Self::PoissonSqrtContent => content.max(0.0).sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reset_zeroes_contents() {
        let mut h = Histogram::new(2);
        h.contents[0] = 3.0;
        h.sumw2[1] = 4.0;
        h.entries = 7;
        h.reset();
        assert_eq!(h, Histogram::new(2));
    }

    #[test]
    fn partial_merge_accumulates() {
        let mut h = Histogram::new(3);
        let mut p1 = HistogramPartial::new(3);
        p1.contents[0] = 1.0;
        p1.sumw2[0] = 1.0;
        p1.entries = 1;
        let mut p2 = HistogramPartial::new(3);
        p2.contents[2] = 2.0;
        p2.sumw2[2] = 4.0;
        p2.entries = 1;

        p1.merge_into(&mut h).unwrap();
        p2.merge_into(&mut h).unwrap();
        assert_eq!(h.contents, vec![1.0, 0.0, 2.0]);
        assert_eq!(h.sumw2, vec![1.0, 0.0, 4.0]);
        assert_eq!(h.entries, 2);
        assert_eq!(h.total(), 3.0);
    }

    #[test]
    fn partial_merge_rejects_bin_mismatch() {
        let mut h = Histogram::new(3);
        let p = HistogramPartial::new(2);
        assert!(p.merge_into(&mut h).is_err());
    }

    #[test]
    fn error_policies() {
        assert_relative_eq!(BinErrorPolicy::SumWeightsSquared.error(10.0, 9.0), 3.0);
        assert_relative_eq!(BinErrorPolicy::PoissonSqrtContent.error(16.0, 9.0), 4.0);
        // Negative accumulations clamp to zero rather than produce NaN.
        assert_eq!(BinErrorPolicy::SumWeightsSquared.error(1.0, -1.0), 0.0);
    }
}
