//! Reducing 1-D histogram accumulator.
//!
//! This is the collaborator the spectral power-spectrum operators bin
//! samples into: a fixed-range, fixed-bin-count accumulator that sums
//! sample weights per bin locally and reduces across the owning Domain's
//! process group at `seal`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use latfield_core::{Domain, Error, Result};

/// How `seal` turns accumulated bin weights into the output series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinMode {
    /// Bin value is the raw summed weight.
    Linear,
    /// Bin value is the summed weight divided by the bin width (a
    /// probability density).
    Density,
}

/// The sealed result of a histogram: bin centers and bin values.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Center of each bin.
    pub centers: Vec<f64>,
    /// Per-bin value (raw sum or density, depending on `BinMode`).
    pub values: Vec<f64>,
}

/// A reducing 1-D histogram accumulator.
pub struct Histogram<'d> {
    lower: f64,
    upper: f64,
    nbins: usize,
    binmode: BinMode,
    domain: Option<&'d Domain>,
    committed: bool,
    sum: Vec<f64>,
}

impl<'d> std::fmt::Debug for Histogram<'d> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .field("nbins", &self.nbins)
            .field("binmode", &self.binmode)
            .field("committed", &self.committed)
            .finish()
    }
}

impl<'d> Histogram<'d> {
    /// Construct an uncommitted histogram with `nbins` bins over the
    /// default range `[0, 1]`.
    #[must_use]
    pub fn new(nbins: usize) -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
            nbins: nbins.max(1),
            binmode: BinMode::Linear,
            domain: None,
            committed: false,
            sum: Vec::new(),
        }
    }

    fn guard_mutable(&self, what: &str) -> bool {
        if self.committed {
            tracing::debug!(op = what, "ignored: histogram already committed");
            false
        } else {
            true
        }
    }

    /// Set the lower edge of the binned range along `axis`. Only `axis ==
    /// 0` is meaningful for this 1-D accumulator; other values are
    /// ignored. No-op once committed.
    pub fn set_lower(&mut self, axis: usize, v: f64) {
        if !self.guard_mutable("set_lower") {
            return;
        }
        if axis != 0 {
            tracing::debug!(axis, "ignored: histogram is 1-D");
            return;
        }
        self.lower = v;
    }

    /// Set the upper edge of the binned range along `axis`. See
    /// [`Histogram::set_lower`].
    pub fn set_upper(&mut self, axis: usize, v: f64) {
        if !self.guard_mutable("set_upper") {
            return;
        }
        if axis != 0 {
            tracing::debug!(axis, "ignored: histogram is 1-D");
            return;
        }
        self.upper = v;
    }

    /// Set the bin mode. No-op once committed.
    pub fn set_binmode(&mut self, mode: BinMode) {
        if !self.guard_mutable("set_binmode") {
            return;
        }
        self.binmode = mode;
    }

    /// Attach the Domain whose process group `seal` reduces across.
    /// No-op once committed.
    pub fn set_domain_comm(&mut self, domain: &'d Domain) {
        if !self.guard_mutable("set_domain_comm") {
            return;
        }
        self.domain = Some(domain);
    }

    /// Allocate the per-bin accumulator. Idempotent.
    pub fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.sum = vec![0.0; self.nbins];
        self.committed = true;
    }

    fn bin_of(&self, x: f64) -> Option<usize> {
        if x < self.lower || x >= self.upper {
            return None;
        }
        let width = (self.upper - self.lower) / self.nbins as f64;
        let b = ((x - self.lower) / width) as usize;
        Some(b.min(self.nbins - 1))
    }

    /// Accumulate one weighted sample.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if `commit` has not run.
    pub fn add_sample_1(&mut self, x: f64, w: f64) -> Result<()> {
        if !self.committed {
            return Err(Error::NotCommitted);
        }
        if let Some(b) = self.bin_of(x) {
            self.sum[b] += w;
        }
        Ok(())
    }

    /// Reduce accumulated weights across the attached Domain's process
    /// group (a no-op on a single-process group) and produce the final
    /// per-bin series.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if `commit` has not run.
    pub fn seal(&self) -> Result<Sealed> {
        if !self.committed {
            return Err(Error::NotCommitted);
        }
        let mut sum = self.sum.clone();
        if let Some(domain) = self.domain {
            domain.process_group().all_reduce_sum(&mut sum)?;
        }
        let width = (self.upper - self.lower) / self.nbins as f64;
        let centers: Vec<f64> = (0..self.nbins)
            .map(|b| self.lower + width * (b as f64 + 0.5))
            .collect();
        let values = match self.binmode {
            BinMode::Linear => sum,
            BinMode::Density => sum.into_iter().map(|v| v / width).collect(),
        };
        Ok(Sealed { centers, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_samples_linearly() {
        let mut h = Histogram::new(4);
        h.set_lower(0, 0.0);
        h.set_upper(0, 4.0);
        h.commit();
        h.add_sample_1(0.5, 1.0).unwrap();
        h.add_sample_1(3.5, 2.0).unwrap();
        let sealed = h.seal().unwrap();
        assert_eq!(sealed.values, vec![1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn out_of_range_samples_are_dropped() {
        let mut h = Histogram::new(2);
        h.set_upper(0, 2.0);
        h.commit();
        h.add_sample_1(-1.0, 5.0).unwrap();
        h.add_sample_1(2.0, 5.0).unwrap();
        let sealed = h.seal().unwrap();
        assert_eq!(sealed.values, vec![0.0, 0.0]);
    }

    #[test]
    fn density_mode_divides_by_bin_width() {
        let mut h = Histogram::new(2);
        h.set_upper(0, 4.0);
        h.set_binmode(BinMode::Density);
        h.commit();
        h.add_sample_1(0.5, 2.0).unwrap();
        let sealed = h.seal().unwrap();
        assert_eq!(sealed.values[0], 1.0); // weight 2.0 / bin width 2.0
    }

    #[test]
    fn add_sample_before_commit_errors() {
        let mut h = Histogram::new(4);
        assert!(h.add_sample_1(0.0, 1.0).is_err());
    }
}
