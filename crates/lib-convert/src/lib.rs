//! # lib-convert
//!
//! IBIS to SPICE conversion core for ibis2spice.
//!
//! The pipeline runs leaves first:
//!
//! - **Extraction**: [`extract`] turns a parsed IBIS document into a typed
//!   [`DataModel`] for one component/model pair
//! - **K-parameter solving**: [`Solver`] finds the pull-up/pull-down mixing
//!   coefficients that reproduce each measured V-T waveform
//! - **Compression**: [`compress`] thins a K-parameter series under an error bound
//! - **Generation**: [`Generator`] emits a behavioural SPICE subcircuit
//!
//! [`run_batch`] fans independent conversions out over the rayon pool.

pub mod error;
pub mod model;
pub mod solver;
pub mod compress;
pub mod subckt;
pub mod batch;

pub use error::{ConvertError, ConvertResult};
pub use model::{extract, DataModel, IvKind, IvPoint, IvTable, PackageParasitics, Reference, VtPoint, VtWaveform};
pub use solver::{
    solve, Anomaly, Complementary, Extrapolation, KParamPolicy, Solution, Solver, SolverOptions, TwoFixture,
};
pub use compress::{compress, CompressionStats};
pub use subckt::{
    generate, sanitize_name, write_subcircuit_file, Dialect, GenerateOptions, Generator, IoType,
    KParamsByEdge, SolvedEdge, Stimulus, DEFAULT_THRESHOLD,
};
pub use batch::{
    convert_job, run_batch, BatchOptions, CancelToken, ConversionJob, JobFailure, JobKey, JobOutcome,
    JobReport, JobStatus,
};

/// Synthetic models shared by the unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::*;
    use lib_ibis::{parse_ibs_file, IbisFile, ModelType};
    use lib_types::{Edge, Farads, Henries, Ohms, Triple};

    pub const VCC: f64 = 5.0;
    pub const R_DEVICE: f64 = 20.0;
    const SAMPLES: usize = 21;

    pub fn ibis_document() -> IbisFile {
        parse_ibs_file(include_str!("../tests/data/buffer.ibs")).unwrap()
    }

    fn ground() -> Reference {
        Reference::Ground(Triple::uniform(0.0))
    }

    fn table(kind: IvKind, reference: Reference, rows: impl Iterator<Item = (f64, f64)>) -> IvTable {
        let points = rows
            .map(|(v, i)| IvPoint {
                v,
                i: Triple::new(i, None, None),
            })
            .collect();
        IvTable::new("fixture", kind, reference, points).unwrap()
    }

    fn waveform(edge: Edge, v_fixture: f64, rows: impl Iterator<Item = (f64, f64)>) -> VtWaveform {
        let points = rows
            .map(|(t, v)| VtPoint {
                t,
                v: Triple::new(v, None, None),
            })
            .collect();
        VtWaveform::new("fixture", edge, Ohms::R50.0, Triple::new(v_fixture, None, None), points).unwrap()
    }

    /// Identical ground-referenced `I = V` pull-up and pull-down over 0..5 V,
    /// with 0 -> 5 V and 5 -> 0 V linear edges over 10 ns into 50 ohm at 5 V.
    pub fn linear_model() -> DataModel {
        let mut model = DataModel::new("LIN", "LIN_OUT", ModelType::Output);
        model.voltage_range = Some(Triple::uniform(VCC));
        model.c_comp = Some(Triple::new(Farads::from_pf(1.0).0, None, None));
        let iv = || (0..=5).map(|k| (k as f64, k as f64));
        model.pullup = Some(table(IvKind::Pullup, ground(), iv()));
        model.pulldown = Some(table(IvKind::Pulldown, ground(), iv()));
        model.rising = vec![waveform(
            Edge::Rising,
            VCC,
            (0..=10).map(|k| (k as f64 * 1e-9, 0.5 * k as f64)),
        )];
        model.falling = vec![waveform(
            Edge::Falling,
            VCC,
            (0..=10).map(|k| (k as f64 * 1e-9, VCC - 0.5 * k as f64)),
        )];
        model
    }

    /// Coefficients the driver model's waveforms were computed from.
    pub fn true_k(edge: Edge, idx: usize, n: usize) -> (f64, f64) {
        let s = idx as f64 / (n - 1) as f64;
        match edge {
            Edge::Rising => (s, (1.0 - s).powi(2)),
            Edge::Falling => (1.0 - s, s * s),
        }
    }

    /// Pin voltage of the 20 ohm driver into 50 ohm at `v_fixture`.
    fn pin_voltage(ku: f64, kd: f64, v_fixture: f64) -> f64 {
        let r_fix = Ohms::R50.0;
        (R_DEVICE * v_fixture + r_fix * ku * VCC) / (r_fix * ku + r_fix * kd + R_DEVICE)
    }

    /// 20 ohm linear driver with a supply-referenced pull-up, one waveform per
    /// fixture voltage and edge, package parasitics and a ground clamp that
    /// only conducts below -0.6 V.
    pub fn driver_model(fixture_voltages: &[f64]) -> DataModel {
        let mut model = DataModel::new("DRV1G", "DRV", ModelType::Output);
        let rail = Triple::new(VCC, Some(4.5), Some(5.5));
        model.voltage_range = Some(rail);
        model.c_comp = Some(Triple::new(Farads::from_pf(2.0).0, None, None));
        model.package = Some(PackageParasitics {
            r_pkg: Some(Triple::new(0.25, None, None)),
            l_pkg: Some(Triple::new(Henries::from_nh(2.0).0, None, None)),
            c_pkg: Some(Triple::new(Farads::from_pf(0.5).0, None, None)),
        });
        let axis = || (-2..=4).map(|k| k as f64 * 2.5);
        model.pullup = Some(table(
            IvKind::Pullup,
            Reference::Supply(rail),
            axis().map(|v| (v, -v / R_DEVICE)),
        ));
        model.pulldown = Some(table(IvKind::Pulldown, ground(), axis().map(|v| (v, v / R_DEVICE))));
        model.gnd_clamp = Some(table(
            IvKind::GndClamp,
            ground(),
            [(-5.0, -0.44), (-0.6, 0.0), (10.0, 0.0)].into_iter(),
        ));

        for edge in Edge::ALL {
            let waveforms = fixture_voltages
                .iter()
                .map(|&vf| {
                    waveform(
                        edge,
                        vf,
                        (0..SAMPLES).map(|idx| {
                            let (ku, kd) = true_k(edge, idx, SAMPLES);
                            (idx as f64 * 1e-10, pin_voltage(ku, kd, vf))
                        }),
                    )
                })
                .collect();
            match edge {
                Edge::Rising => model.rising = waveforms,
                Edge::Falling => model.falling = waveforms,
            }
        }
        model
    }

    /// Receiver with die capacitance, clamps and thresholds.
    pub fn input_model() -> DataModel {
        let mut model = DataModel::new("RCV1G", "RCV", ModelType::Input);
        model.voltage_range = Some(Triple::uniform(VCC));
        model.c_comp = Some(Triple::new(Farads::from_pf(1.0).0, None, None));
        let clamp = [(-5.0, 0.44), (-0.6, 0.0), (10.0, 0.0)];
        model.power_clamp = Some(table(
            IvKind::PowerClamp,
            Reference::Supply(Triple::uniform(VCC)),
            clamp.into_iter(),
        ));
        model.gnd_clamp = Some(table(
            IvKind::GndClamp,
            ground(),
            clamp.into_iter().map(|(v, i)| (v, -i)),
        ));
        model.vinl = Some(0.8);
        model.vinh = Some(2.0);
        model
    }

    fn map_waveforms(model: &mut DataModel, f: impl Fn(f64) -> f64) {
        let remap = |edge: Edge, wf: &VtWaveform| {
            let points = wf
                .points()
                .iter()
                .map(|p| VtPoint { t: p.t, v: p.v.map(&f) })
                .collect();
            VtWaveform::new("fixture", edge, wf.r_fixture, wf.v_fixture, points).unwrap()
        };
        model.rising = model.rising.iter().map(|wf| remap(Edge::Rising, wf)).collect();
        model.falling = model.falling.iter().map(|wf| remap(Edge::Falling, wf)).collect();
    }

    pub fn shift_waveforms(model: &mut DataModel, dv: f64) {
        map_waveforms(model, |v| v + dv);
    }

    pub fn scale_waveforms(model: &mut DataModel, factor: f64) {
        map_waveforms(model, |v| v * factor);
    }
}
