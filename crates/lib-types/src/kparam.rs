//! K-parameter time series.
//!
//! A K-parameter series describes how strongly the pull-up (`Ku`) and
//! pull-down (`Kd`) networks of an output buffer conduct over one transition.
//! `(Ku, Kd) = (1, 0)` is the steady high state, `(0, 1)` the steady low
//! state. Samples are point values at strictly increasing times; values in
//! between are obtained by linear interpolation, which is also how a SPICE
//! PWL source replays them.

use crate::units::Seconds;
use serde::{Deserialize, Serialize};

/// One `(t, Ku, Kd)` sample. Time is in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KParamSample {
    pub t: f64,
    pub ku: f64,
    pub kd: f64,
}

impl KParamSample {
    #[inline]
    pub fn new(t: f64, ku: f64, kd: f64) -> Self {
        Self { t, ku, kd }
    }
}

/// Ordered K-parameter samples with strictly increasing time and both
/// coefficients inside `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KParamSeries {
    samples: Vec<KParamSample>,
}

impl KParamSeries {
    /// Create a series. Fails if times are not strictly
    /// increasing or a coefficient is outside `[0, 1]` or not finite.
    pub fn try_new(samples: Vec<KParamSample>) -> Result<Self, &'static str> {
        for s in &samples {
            if !s.t.is_finite() {
                return Err("sample time is not finite");
            }
            if !(0.0..=1.0).contains(&s.ku) || !(0.0..=1.0).contains(&s.kd) {
                return Err("Ku and Kd must lie in [0, 1]");
            }
        }
        if samples.windows(2).any(|w| w[1].t <= w[0].t) {
            return Err("sample times must be strictly increasing");
        }
        Ok(Self { samples })
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[KParamSample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KParamSample> {
        self.samples.iter()
    }

    pub fn first(&self) -> Option<&KParamSample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&KParamSample> {
        self.samples.last()
    }

    /// Time from the first to the last sample.
    pub fn duration(&self) -> Seconds {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => Seconds(b.t - a.t),
            _ => Seconds::ZERO,
        }
    }

    /// Linearly interpolated `(Ku, Kd)` at time `t`, holding the end values
    /// outside the sampled span. Returns `None` for an empty series.
    pub fn value_at(&self, t: f64) -> Option<(f64, f64)> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if t <= first.t {
            return Some((first.ku, first.kd));
        }
        if t >= last.t {
            return Some((last.ku, last.kd));
        }
        let upper = self.samples.partition_point(|s| s.t <= t);
        let a = &self.samples[upper - 1];
        let b = &self.samples[upper];
        let frac = (t - a.t) / (b.t - a.t);
        Some((a.ku + frac * (b.ku - a.ku), a.kd + frac * (b.kd - a.kd)))
    }
}

impl<'a> IntoIterator for &'a KParamSeries {
    type Item = &'a KParamSample;
    type IntoIter = std::slice::Iter<'a, KParamSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> KParamSeries {
        KParamSeries::try_new(vec![
            KParamSample::new(0.0, 0.0, 1.0),
            KParamSample::new(1e-9, 0.5, 0.5),
            KParamSample::new(2e-9, 1.0, 0.0),
        ]).unwrap()
    }

    #[test]
    fn test_series_basics() {
        let s = ramp();
        assert_eq!(s.len(), 3);
        assert!((s.duration().as_ns() - 2.0).abs() < 1e-9);
        assert_eq!(s.first().unwrap().kd, 1.0);
    }

    #[test]
    fn test_value_at_interpolates_and_holds() {
        let s = ramp();
        let (ku, kd) = s.value_at(0.5e-9).unwrap();
        assert!((ku - 0.25).abs() < 1e-12);
        assert!((kd - 0.75).abs() < 1e-12);
        assert_eq!(s.value_at(-1.0), Some((0.0, 1.0)));
        assert_eq!(s.value_at(1.0), Some((1.0, 0.0)));
    }

    #[test]
    fn test_invariants_rejected() {
        assert!(KParamSeries::try_new(vec![
            KParamSample::new(0.0, 0.0, 1.0),
            KParamSample::new(0.0, 1.0, 0.0),
        ])
        .is_err());
        assert!(KParamSeries::try_new(vec![KParamSample::new(0.0, 1.2, 0.0)]).is_err());
        assert!(KParamSeries::try_new(vec![KParamSample::new(0.0, f64::NAN, 0.0)]).is_err());
        assert!(KParamSeries::try_new(Vec::new()).unwrap().is_empty());
    }
}
