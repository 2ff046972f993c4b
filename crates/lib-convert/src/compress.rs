//! K-parameter series compression.
//!
//! Ramer-Douglas-Peucker on the time-aligned deviation `max(|dKu|, |dKd|)`.
//! A segment is split at the first sample of maximum deviation while that
//! deviation exceeds the threshold. Retained samples are a subset of the
//! input, so a PWL source replaying the output stays within `threshold` of
//! the solved series at every discarded sample.

use crate::error::{ConvertError, ConvertResult};
use lib_types::{KParamSample, KParamSeries};
use serde::Serialize;

/// Sample counts before and after compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompressionStats {
    pub original: usize,
    pub retained: usize,
}

impl CompressionStats {
    pub fn new(original: &KParamSeries, compressed: &KParamSeries) -> Self {
        Self {
            original: original.len(),
            retained: compressed.len(),
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original == 0 {
            return 0.0;
        }
        100.0 * (self.original - self.retained) as f64 / self.original as f64
    }
}

/// Drop samples reproduced within `threshold` by linear interpolation
/// between the retained neighbours.
pub fn compress(series: &KParamSeries, threshold: f64) -> ConvertResult<KParamSeries> {
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(ConvertError::invalid_argument(
            "threshold",
            format!("must be a positive finite number, got {}", threshold),
        ));
    }
    let samples = series.samples();
    let n = samples.len();
    if n < 3 {
        return Ok(series.clone());
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((lo, hi)) = stack.pop() {
        if hi - lo < 2 {
            continue;
        }
        let mut worst = 0.0;
        let mut split = None;
        for k in lo + 1..hi {
            let d = deviation(&samples[lo], &samples[hi], &samples[k]);
            if d > worst {
                worst = d;
                split = Some(k);
            }
        }
        if let Some(k) = split {
            if worst > threshold {
                keep[k] = true;
                stack.push((k, hi));
                stack.push((lo, k));
            }
        }
    }

    let retained: Vec<KParamSample> = samples
        .iter()
        .zip(&keep)
        .filter_map(|(s, &k)| k.then_some(*s))
        .collect();
    let compressed = KParamSeries::try_new(retained)
        .map_err(|msg| ConvertError::invalid_argument("series", msg))?;

    let stats = CompressionStats::new(series, &compressed);
    tracing::debug!(
        original = stats.original,
        retained = stats.retained,
        "Compressed K-parameters by {:.1}%",
        stats.reduction_percent()
    );
    Ok(compressed)
}

/// Deviation of `s` from the chord `a`-`b`, measured at `s.t`.
#[inline]
fn deviation(a: &KParamSample, b: &KParamSample, s: &KParamSample) -> f64 {
    let frac = (s.t - a.t) / (b.t - a.t);
    let ku = a.ku + frac * (b.ku - a.ku);
    let kd = a.kd + frac * (b.kd - a.kd);
    (s.ku - ku).abs().max((s.kd - kd).abs())
}
