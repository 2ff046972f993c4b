//! K-parameter solver.
//!
//! For every sample of a measured V-T waveform the buffer's pin current must
//! balance the fixture current:
//!
//! ```text
//! Ku * I_pu(v) + Kd * I_pd(v) + I_clamp(v) = (V_fixture - v) / R_fixture
//! ```
//!
//! One waveform gives one equation per sample for two unknowns, so a
//! [`KParamPolicy`] supplies the missing constraint. [`Complementary`]
//! assumes `Ku + Kd = 1`; [`TwoFixture`] uses a second waveform of the same
//! edge measured into a different fixture and solves the 2x2 system.

use crate::error::{ConvertError, ConvertResult};
use crate::model::{DataModel, IvTable, VtWaveform};
use lib_types::{Corner, Edge, KParamSample, KParamSeries, Ohms, Volts};
use serde::{Deserialize, Serialize};

/// Default tolerance outside `[0, 1]` before a raw value is an anomaly.
pub const DEFAULT_ANOMALY_EPSILON: f64 = 1e-3;

/// Default relative tolerance for a degenerate or singular system.
pub const DEFAULT_DEGENERACY_TOLERANCE: f64 = 1e-9;

/// How I-V tables are evaluated outside their voltage domain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Any out-of-domain sample is unsolvable.
    Disabled,
    /// Hold the boundary current within `margin` volts of the domain.
    /// `None` uses the table's own voltage span.
    Clamp { margin: Option<f64> },
}

impl Default for Extrapolation {
    fn default() -> Self {
        Self::Clamp { margin: None }
    }
}

/// Solver configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub extrapolation: Extrapolation,
    pub anomaly_epsilon: f64,
    pub degeneracy_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            extrapolation: Extrapolation::default(),
            anomaly_epsilon: DEFAULT_ANOMALY_EPSILON,
            degeneracy_tolerance: DEFAULT_DEGENERACY_TOLERANCE,
        }
    }
}

/// A solved value that fell outside `[-eps, 1 + eps]` before clamping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Anomaly {
    pub time: f64,
    pub raw_ku: f64,
    pub raw_kd: f64,
}

/// Solver result with the anomalies seen along the way.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Solution {
    pub series: KParamSeries,
    pub anomalies: Vec<Anomaly>,
    pub policy: &'static str,
}

/// Currents at one waveform sample, all positive into the buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperatingPoint {
    pub voltage: f64,
    pub i_fixture: f64,
    pub i_pullup: f64,
    pub i_pulldown: f64,
    pub i_clamp: f64,
}

/// Everything a policy needs to resolve one interior sample.
#[derive(Clone, Copy, Debug)]
pub struct SampleContext {
    pub edge: Edge,
    pub time: f64,
    /// Waveform progress in `[0, 1]` from first to last voltage.
    pub progress: f64,
    pub primary: OperatingPoint,
    /// The same instant on a second fixture, when the policy asked for one.
    pub secondary: Option<OperatingPoint>,
}

impl SampleContext {
    /// `(Ku, Kd)` interpolated between the edge's steady states by progress.
    pub fn progress_state(&self) -> (f64, f64) {
        let p = self.progress;
        match self.edge {
            Edge::Rising => (p, 1.0 - p),
            Edge::Falling => (1.0 - p, p),
        }
    }
}

/// Rule for resolving `(Ku, Kd)` at an interior waveform sample.
pub trait KParamPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the solver should evaluate a second waveform of the same edge.
    fn uses_second_fixture(&self) -> bool {
        false
    }

    /// Raw, unclamped `(Ku, Kd)` for one sample.
    fn solve_sample(&self, ctx: &SampleContext) -> (f64, f64);
}

/// Single-waveform policy assuming `Ku + Kd = 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Complementary {
    pub tolerance: f64,
}

impl Default for Complementary {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_DEGENERACY_TOLERANCE,
        }
    }
}

impl KParamPolicy for Complementary {
    fn name(&self) -> &'static str {
        "complementary"
    }

    fn solve_sample(&self, ctx: &SampleContext) -> (f64, f64) {
        let op = &ctx.primary;
        let denom = op.i_pullup - op.i_pulldown;
        let scale = op.i_pullup.abs().max(op.i_pulldown.abs());
        if scale == 0.0 || denom.abs() <= self.tolerance * scale {
            return ctx.progress_state();
        }
        let ku = (op.i_fixture - op.i_clamp - op.i_pulldown) / denom;
        (ku, 1.0 - ku)
    }
}

/// Two-waveform policy solving both fixture equations by Cramer's rule.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TwoFixture {
    pub fallback: Complementary,
}

impl KParamPolicy for TwoFixture {
    fn name(&self) -> &'static str {
        "two_fixture"
    }

    fn uses_second_fixture(&self) -> bool {
        true
    }

    fn solve_sample(&self, ctx: &SampleContext) -> (f64, f64) {
        let Some(b) = ctx.secondary else {
            return self.fallback.solve_sample(ctx);
        };
        let a = ctx.primary;

        let det = a.i_pullup * b.i_pulldown - a.i_pulldown * b.i_pullup;
        let scale = (a.i_pullup * b.i_pulldown)
            .abs()
            .max((a.i_pulldown * b.i_pullup).abs());
        if scale == 0.0 || det.abs() <= self.fallback.tolerance * scale {
            return self.fallback.solve_sample(ctx);
        }

        let ra = a.i_fixture - a.i_clamp;
        let rb = b.i_fixture - b.i_clamp;
        let ku = (ra * b.i_pulldown - a.i_pulldown * rb) / det;
        let kd = (a.i_pullup * rb - ra * b.i_pullup) / det;
        (ku, kd)
    }
}

/// K-parameter solver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Solver {
    options: SolverOptions,
}

impl Solver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Solve with [`TwoFixture`] when the edge has two or more waveforms,
    /// [`Complementary`] otherwise.
    pub fn solve_detailed(&self, model: &DataModel, corner: Corner, edge: Edge) -> ConvertResult<Solution> {
        let complementary = Complementary {
            tolerance: self.options.degeneracy_tolerance,
        };
        if model.waveforms(edge).len() >= 2 {
            let policy = TwoFixture {
                fallback: complementary,
            };
            self.solve_with_policy(model, corner, edge, &policy)
        } else {
            self.solve_with_policy(model, corner, edge, &complementary)
        }
    }

    /// Solve one edge at one corner with an explicit policy.
    pub fn solve_with_policy(
        &self,
        model: &DataModel,
        corner: Corner,
        edge: Edge,
        policy: &dyn KParamPolicy,
    ) -> ConvertResult<Solution> {
        let waveforms = model.waveforms(edge);
        let primary = waveforms.first().ok_or_else(|| ConvertError::NoWaveform {
            model: model.model.clone(),
            edge,
        })?;

        let tables = Tables::new(model, corner, edge, self.options.extrapolation);
        let fixture = Fixture::new(model, primary, corner, edge);
        let second = if policy.uses_second_fixture() {
            waveforms.get(1).map(|wf| Fixture::new(model, wf, corner, edge))
        } else {
            None
        };

        let column = primary.column(corner);
        let n = column.len();
        let (t_first, v_first) = column[0];
        let (t_last, v_last) = column[n - 1];
        let eps = self.options.anomaly_epsilon;

        let mut samples = Vec::with_capacity(n);
        let mut anomalies = Vec::new();
        for (idx, &(t, v)) in column.iter().enumerate() {
            let primary_op = tables.operating_point(&fixture, t, v)?;
            let secondary_op = match &second {
                Some(f) => Some(tables.operating_point(f, t, f.voltage_at(t))?),
                None => None,
            };

            let (ku, kd) = if idx == 0 {
                edge.initial_state()
            } else if idx == n - 1 {
                edge.final_state()
            } else {
                let ctx = SampleContext {
                    edge,
                    time: t,
                    progress: progress(v, v_first, v_last, t, t_first, t_last),
                    primary: primary_op,
                    secondary: secondary_op,
                };
                let (raw_ku, raw_kd) = policy.solve_sample(&ctx);
                if !(raw_ku.is_finite() && raw_kd.is_finite()) {
                    anomalies.push(Anomaly { time: t, raw_ku, raw_kd });
                    ctx.progress_state()
                } else {
                    let outside = |k: f64| k < -eps || k > 1.0 + eps;
                    if outside(raw_ku) || outside(raw_kd) {
                        anomalies.push(Anomaly { time: t, raw_ku, raw_kd });
                    }
                    (raw_ku.clamp(0.0, 1.0), raw_kd.clamp(0.0, 1.0))
                }
            };
            samples.push(KParamSample::new(t, ku, kd));
        }

        let series = KParamSeries::try_new(samples)
            .map_err(|msg| ConvertError::incomplete(model.model.as_str(), msg))?;
        tracing::debug!(
            model = %model.model,
            %corner,
            %edge,
            policy = policy.name(),
            samples = series.len(),
            anomalies = anomalies.len(),
            "Solved K-parameters"
        );
        Ok(Solution {
            series,
            anomalies,
            policy: policy.name(),
        })
    }
}

/// Solve with default options, logging anomalies as warnings.
pub fn solve(model: &DataModel, corner: Corner, edge: Edge) -> ConvertResult<KParamSeries> {
    let solution = Solver::default().solve_detailed(model, corner, edge)?;
    log_anomalies(model, corner, edge, &solution.anomalies);
    Ok(solution.series)
}

pub(crate) fn log_anomalies(model: &DataModel, corner: Corner, edge: Edge, anomalies: &[Anomaly]) {
    for a in anomalies {
        tracing::warn!(
            "Model {} ({}, {}): K-parameters out of range at t={:e}s (Ku={:.4}, Kd={:.4}), clamped",
            model.model,
            corner,
            edge,
            a.time,
            a.raw_ku,
            a.raw_kd
        );
    }
}

/// Progress from the first to the last voltage, by time when the waveform is flat.
fn progress(v: f64, v_first: f64, v_last: f64, t: f64, t_first: f64, t_last: f64) -> f64 {
    let span = v_last - v_first;
    let p = if span.abs() > f64::EPSILON * v_first.abs().max(v_last.abs()).max(1.0) {
        (v - v_first) / span
    } else {
        (t - t_first) / (t_last - t_first)
    };
    p.clamp(0.0, 1.0)
}

/// Fixture of one waveform at the solved corner.
struct Fixture {
    r: f64,
    v: f64,
    column: Vec<(f64, f64)>,
}

impl Fixture {
    fn new(model: &DataModel, wf: &VtWaveform, corner: Corner, edge: Edge) -> Self {
        if !wf.has_corner(corner) {
            tracing::debug!(
                "Model {} {} waveform has NA entries at {} corner, using typical",
                model.model,
                edge,
                corner
            );
        }
        Self {
            r: wf.r_fixture,
            v: wf.v_fixture.resolve(corner),
            column: wf.column(corner),
        }
    }

    #[inline]
    fn current(&self, v_pin: f64) -> f64 {
        (Volts(self.v) - Volts(v_pin)) / Ohms(self.r)
    }

    /// Voltage at time `t`, holding the end values outside the waveform.
    fn voltage_at(&self, t: f64) -> f64 {
        interpolate(&self.column, t)
    }
}

/// One I-V table at the solved corner.
struct Curve<'a> {
    table: &'a IvTable,
    points: Vec<(f64, f64)>,
}

impl<'a> Curve<'a> {
    fn new(model: &DataModel, table: &'a IvTable, corner: Corner) -> Self {
        if !table.has_corner(corner) {
            tracing::debug!(
                "Model {} {} table has NA entries at {} corner, using typical",
                model.model,
                table.kind().label(),
                corner
            );
        }
        Self {
            table,
            points: table.column(corner),
        }
    }
}

struct Tables<'a> {
    model: &'a DataModel,
    corner: Corner,
    edge: Edge,
    extrapolation: Extrapolation,
    pullup: Option<Curve<'a>>,
    pulldown: Option<Curve<'a>>,
    clamps: Vec<Curve<'a>>,
}

impl<'a> Tables<'a> {
    fn new(model: &'a DataModel, corner: Corner, edge: Edge, extrapolation: Extrapolation) -> Self {
        let curve = |t: &'a IvTable| Curve::new(model, t, corner);
        Self {
            model,
            corner,
            edge,
            extrapolation,
            pullup: model.pullup.as_ref().map(curve),
            pulldown: model.pulldown.as_ref().map(curve),
            clamps: [&model.power_clamp, &model.gnd_clamp]
                .into_iter()
                .filter_map(|t| t.as_ref().map(curve))
                .collect(),
        }
    }

    fn operating_point(&self, fixture: &Fixture, t: f64, v: f64) -> ConvertResult<OperatingPoint> {
        let eval = |curve: &Option<Curve<'a>>| -> ConvertResult<f64> {
            match curve {
                Some(c) => self.current(c, t, v),
                None => Ok(0.0),
            }
        };
        let i_pullup = eval(&self.pullup)?;
        let i_pulldown = eval(&self.pulldown)?;
        let mut i_clamp = 0.0;
        for c in &self.clamps {
            i_clamp += self.current(c, t, v)?;
        }
        Ok(OperatingPoint {
            voltage: v,
            i_fixture: fixture.current(v),
            i_pullup,
            i_pulldown,
            i_clamp,
        })
    }

    /// Current of one table at pin voltage `v`, honouring the extrapolation policy.
    fn current(&self, curve: &Curve<'_>, t: f64, v: f64) -> ConvertResult<f64> {
        let (lo, hi) = curve.table.domain();
        let reference = curve.table.reference();
        let x = reference.table_voltage(self.corner, v);

        let allowed = match self.extrapolation {
            _ if !x.is_finite() => false,
            _ if (lo..=hi).contains(&x) => true,
            Extrapolation::Disabled => false,
            Extrapolation::Clamp { margin } => {
                let m = margin.unwrap_or(hi - lo);
                x >= lo - m && x <= hi + m
            }
        };
        if !allowed {
            let a = reference.pin_voltage(self.corner, lo);
            let b = reference.pin_voltage(self.corner, hi);
            return Err(ConvertError::UnsolvableSample {
                model: self.model.model.clone(),
                corner: self.corner,
                edge: self.edge,
                time: t,
                voltage: v,
                table: curve.table.kind().label(),
                domain_lo: a.min(b),
                domain_hi: a.max(b),
            });
        }
        Ok(interpolate(&curve.points, x))
    }
}

/// Piecewise-linear lookup over `(x, y)` pairs sorted by `x`, holding the end
/// values outside the range.
pub(crate) fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    let (Some(&(x0, y0)), Some(&(xn, yn))) = (points.first(), points.last()) else {
        return 0.0;
    };
    if x <= x0 {
        return y0;
    }
    if x >= xn {
        return yn;
    }
    let upper = points.partition_point(|&(px, _)| px <= x);
    let (xa, ya) = points[upper - 1];
    let (xb, yb) = points[upper];
    ya + (x - xa) / (xb - xa) * (yb - ya)
}
