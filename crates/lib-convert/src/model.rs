//! Typed buffer model assembled from a parsed IBIS document.
//!
//! A [`DataModel`] is the unit of work for one component/model pair. Values
//! keep their IBIS units (volts, amps, seconds, farads). Tables are sorted
//! by their abscissa and duplicate abscissae are rejected, so every later
//! stage can rely on strictly increasing voltage and time axes.

use crate::error::{ConvertError, ConvertResult};
use lib_ibis::{IVTable, IbisFile, ModelType, TableRow, WaveformTable};
use lib_types::{Corner, Edge, Triple};
use serde::Serialize;

/// Which device an I-V table describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IvKind {
    Pullup,
    Pulldown,
    PowerClamp,
    GndClamp,
}

impl IvKind {
    pub const ALL: [IvKind; 4] = [
        IvKind::Pullup,
        IvKind::Pulldown,
        IvKind::PowerClamp,
        IvKind::GndClamp,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pullup => "pullup",
            Self::Pulldown => "pulldown",
            Self::PowerClamp => "power_clamp",
            Self::GndClamp => "gnd_clamp",
        }
    }
}

/// Voltage reference of an I-V table axis.
///
/// Pull-up and power-clamp tables are measured from a supply rail down to
/// the pin, pull-down and ground-clamp tables from a ground reference up to
/// the pin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "volts", rename_all = "snake_case")]
pub enum Reference {
    Ground(Triple<f64>),
    Supply(Triple<f64>),
}

impl Reference {
    /// Reference voltage at a corner, with `NA` resolved to typical.
    pub fn volts(&self, corner: Corner) -> f64 {
        match self {
            Self::Ground(r) | Self::Supply(r) => r.resolve(corner),
        }
    }

    /// Map a pin voltage onto the table axis.
    #[inline]
    pub fn table_voltage(&self, corner: Corner, v_pin: f64) -> f64 {
        match self {
            Self::Ground(_) => v_pin - self.volts(corner),
            Self::Supply(_) => self.volts(corner) - v_pin,
        }
    }

    /// Map a table-axis voltage back to the pin voltage.
    #[inline]
    pub fn pin_voltage(&self, corner: Corner, v_table: f64) -> f64 {
        match self {
            Self::Ground(_) => v_table + self.volts(corner),
            Self::Supply(_) => self.volts(corner) - v_table,
        }
    }
}

/// One I-V table row: table-axis voltage and the current triple.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IvPoint {
    pub v: f64,
    pub i: Triple<f64>,
}

/// I-V table with strictly increasing voltage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IvTable {
    kind: IvKind,
    reference: Reference,
    points: Vec<IvPoint>,
}

impl IvTable {
    /// Build a table, sorting by voltage. Fails on an empty table or a
    /// repeated voltage.
    pub fn new(
        model: &str,
        kind: IvKind,
        reference: Reference,
        mut points: Vec<IvPoint>,
    ) -> ConvertResult<Self> {
        if points.is_empty() {
            return Err(ConvertError::incomplete(
                model,
                format!("{} table has no rows", kind.label()),
            ));
        }
        points.sort_by(|a, b| a.v.total_cmp(&b.v));
        if let Some(w) = points.windows(2).find(|w| w[0].v == w[1].v) {
            return Err(ConvertError::incomplete(
                model,
                format!("{} table repeats voltage {}", kind.label(), w[0].v),
            ));
        }
        Ok(Self {
            kind,
            reference,
            points,
        })
    }

    #[inline]
    pub fn kind(&self) -> IvKind {
        self.kind
    }

    #[inline]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    #[inline]
    pub fn points(&self) -> &[IvPoint] {
        &self.points
    }

    /// Table-axis voltage domain `(lo, hi)`.
    pub fn domain(&self) -> (f64, f64) {
        let lo = self.points.first().map_or(0.0, |p| p.v);
        let hi = self.points.last().map_or(0.0, |p| p.v);
        (lo, hi)
    }

    /// True when every row has a value for `corner`.
    pub fn has_corner(&self, corner: Corner) -> bool {
        self.points.iter().all(|p| p.i.get(corner).is_some())
    }

    /// `(voltage, current)` pairs for one corner; `NA` entries use typical.
    pub fn column(&self, corner: Corner) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.v, p.i.resolve(corner)))
            .collect()
    }
}

/// One V-T waveform row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VtPoint {
    pub t: f64,
    pub v: Triple<f64>,
}

/// A measured transition into a fixture load.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VtWaveform {
    pub r_fixture: f64,
    pub v_fixture: Triple<f64>,
    pub c_fixture: Option<f64>,
    pub l_fixture: Option<f64>,
    points: Vec<VtPoint>,
}

impl VtWaveform {
    /// Build a waveform, sorting by time. Fails when fewer than two rows
    /// remain, a time repeats, or the fixture resistance is not positive.
    pub fn new(
        model: &str,
        edge: Edge,
        r_fixture: f64,
        v_fixture: Triple<f64>,
        mut points: Vec<VtPoint>,
    ) -> ConvertResult<Self> {
        if !(r_fixture.is_finite() && r_fixture > 0.0) {
            return Err(ConvertError::incomplete(
                model,
                format!("{} waveform R_fixture must be positive, got {}", edge, r_fixture),
            ));
        }
        if points.len() < 2 {
            return Err(ConvertError::incomplete(
                model,
                format!("{} waveform needs at least two rows", edge),
            ));
        }
        points.sort_by(|a, b| a.t.total_cmp(&b.t));
        if let Some(w) = points.windows(2).find(|w| w[0].t == w[1].t) {
            return Err(ConvertError::incomplete(
                model,
                format!("{} waveform repeats time {:e}", edge, w[0].t),
            ));
        }
        Ok(Self {
            r_fixture,
            v_fixture,
            c_fixture: None,
            l_fixture: None,
            points,
        })
    }

    #[inline]
    pub fn points(&self) -> &[VtPoint] {
        &self.points
    }

    pub fn has_corner(&self, corner: Corner) -> bool {
        self.v_fixture.get(corner).is_some()
            && self.points.iter().all(|p| p.v.get(corner).is_some())
    }

    /// `(time, voltage)` pairs for one corner; `NA` entries use typical.
    pub fn column(&self, corner: Corner) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.t, p.v.resolve(corner)))
            .collect()
    }

    pub fn duration(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => b.t - a.t,
            _ => 0.0,
        }
    }
}

/// Package parasitics from the component's `[Package]` section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PackageParasitics {
    pub r_pkg: Option<Triple<f64>>,
    pub l_pkg: Option<Triple<f64>>,
    pub c_pkg: Option<Triple<f64>>,
}

impl PackageParasitics {
    /// `(R, L, C)` at a corner, zero when absent.
    pub fn at(&self, corner: Corner) -> (f64, f64, f64) {
        let value = |t: &Option<Triple<f64>>| t.map_or(0.0, |t| t.resolve(corner));
        (value(&self.r_pkg), value(&self.l_pkg), value(&self.c_pkg))
    }
}

/// Typed buffer model for one component/model pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataModel {
    pub component: String,
    pub model: String,
    pub model_type: ModelType,
    pub voltage_range: Option<Triple<f64>>,
    pub temperature_range: Option<Triple<f64>>,
    pub c_comp: Option<Triple<f64>>,
    pub pullup: Option<IvTable>,
    pub pulldown: Option<IvTable>,
    pub power_clamp: Option<IvTable>,
    pub gnd_clamp: Option<IvTable>,
    pub rising: Vec<VtWaveform>,
    pub falling: Vec<VtWaveform>,
    pub package: Option<PackageParasitics>,
    pub vinl: Option<f64>,
    pub vinh: Option<f64>,
}

impl DataModel {
    /// Empty model of the given type, for building models in code.
    pub fn new(component: impl Into<String>, model: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            component: component.into(),
            model: model.into(),
            model_type,
            voltage_range: None,
            temperature_range: None,
            c_comp: None,
            pullup: None,
            pulldown: None,
            power_clamp: None,
            gnd_clamp: None,
            rising: Vec::new(),
            falling: Vec::new(),
            package: None,
            vinl: None,
            vinh: None,
        }
    }

    pub fn waveforms(&self, edge: Edge) -> &[VtWaveform] {
        match edge {
            Edge::Rising => &self.rising,
            Edge::Falling => &self.falling,
        }
    }

    pub fn table(&self, kind: IvKind) -> Option<&IvTable> {
        match kind {
            IvKind::Pullup => self.pullup.as_ref(),
            IvKind::Pulldown => self.pulldown.as_ref(),
            IvKind::PowerClamp => self.power_clamp.as_ref(),
            IvKind::GndClamp => self.gnd_clamp.as_ref(),
        }
    }

    /// Present I-V tables in pull-up, pull-down, power-clamp, ground-clamp order.
    pub fn tables(&self) -> impl Iterator<Item = &IvTable> {
        IvKind::ALL.into_iter().filter_map(|kind| self.table(kind))
    }

    /// True when the model can drive the pin in at least one direction.
    pub fn has_driver(&self) -> bool {
        self.pullup.is_some() || self.pulldown.is_some()
    }
}

/// Assemble a [`DataModel`] from a parsed IBIS document.
///
/// Package parasitics come from the component's `[Package]` triple. Per-pin
/// `R_pin`/`L_pin`/`C_pin` columns are parsed but not applied here.
pub fn extract(doc: &IbisFile, component_name: &str, model_name: &str) -> ConvertResult<DataModel> {
    let component = doc
        .component(component_name)
        .ok_or_else(|| ConvertError::not_found("component", component_name))?;
    let model = doc
        .model(model_name)
        .ok_or_else(|| ConvertError::not_found("model", model_name))?;

    if !component.pins.iter().any(|p| p.model_name == model_name) {
        tracing::debug!(
            "Model {} is not referenced by any pin of {}; using it from the model list",
            model_name,
            component_name
        );
    }

    let name = model.name.as_str();
    let supply = |explicit: Option<Triple<f64>>, table: &str| -> ConvertResult<Reference> {
        explicit
            .or(model.voltage_range)
            .map(Reference::Supply)
            .ok_or_else(|| {
                ConvertError::incomplete(
                    name,
                    format!("{} table needs [Voltage Range] or an explicit reference", table),
                )
            })
    };
    let ground = |explicit: Option<Triple<f64>>| {
        Reference::Ground(explicit.unwrap_or_else(|| Triple::uniform(0.0)))
    };

    let pullup = model
        .pullup
        .as_ref()
        .map(|t| -> ConvertResult<IvTable> {
            let reference = supply(model.pullup_reference, "[Pullup]")?;
            iv_table(name, IvKind::Pullup, reference, t)
        })
        .transpose()?;
    let power_clamp = model
        .power_clamp
        .as_ref()
        .map(|t| -> ConvertResult<IvTable> {
            let reference = supply(model.power_clamp_reference, "[POWER Clamp]")?;
            iv_table(name, IvKind::PowerClamp, reference, t)
        })
        .transpose()?;
    let pulldown = model
        .pulldown
        .as_ref()
        .map(|t| iv_table(name, IvKind::Pulldown, ground(model.pulldown_reference), t))
        .transpose()?;
    let gnd_clamp = model
        .gnd_clamp
        .as_ref()
        .map(|t| iv_table(name, IvKind::GndClamp, ground(model.gnd_clamp_reference), t))
        .transpose()?;

    if model.model_type.is_driver() && pullup.is_none() && pulldown.is_none() {
        return Err(ConvertError::incomplete(
            name,
            format!(
                "{} model has neither [Pullup] nor [Pulldown]",
                model.model_type.ibis_name()
            ),
        ));
    }

    let rising = waveforms(name, Edge::Rising, &model.rising_waveform)?;
    let falling = waveforms(name, Edge::Falling, &model.falling_waveform)?;

    let package = component.package.as_ref().map(|p| PackageParasitics {
        r_pkg: p.r_pkg,
        l_pkg: p.l_pkg,
        c_pkg: p.c_pkg,
    });

    tracing::debug!(
        component = component_name,
        model = model_name,
        rising = rising.len(),
        falling = falling.len(),
        "Extracted {} model",
        model.model_type.ibis_name()
    );

    Ok(DataModel {
        component: component.name.clone(),
        model: model.name.clone(),
        model_type: model.model_type,
        voltage_range: model.voltage_range,
        temperature_range: model.temperature_range,
        c_comp: model.c_comp,
        pullup,
        pulldown,
        power_clamp,
        gnd_clamp,
        rising,
        falling,
        package,
        vinl: model.vinl,
        vinh: model.vinh,
    })
}

fn iv_table(model: &str, kind: IvKind, reference: Reference, table: &IVTable) -> ConvertResult<IvTable> {
    let points = table
        .points
        .iter()
        .map(|row: &TableRow| IvPoint {
            v: row.x,
            i: row.values,
        })
        .collect();
    IvTable::new(model, kind, reference, points)
}

fn waveforms(model: &str, edge: Edge, tables: &[WaveformTable]) -> ConvertResult<Vec<VtWaveform>> {
    tables
        .iter()
        .map(|wf| {
            let r_fixture = wf.r_fixture.ok_or_else(|| {
                ConvertError::incomplete(model, format!("{} waveform has no R_fixture", edge))
            })?;
            let v_fixture = wf.v_fixture.ok_or_else(|| {
                ConvertError::incomplete(model, format!("{} waveform has no V_fixture", edge))
            })?;
            let points = wf
                .points
                .iter()
                .map(|row| VtPoint {
                    t: row.x,
                    v: row.values,
                })
                .collect();
            let mut waveform = VtWaveform::new(
                model,
                edge,
                r_fixture,
                Triple::new(v_fixture, wf.v_fixture_min, wf.v_fixture_max),
                points,
            )?;
            waveform.c_fixture = wf.c_fixture;
            waveform.l_fixture = wf.l_fixture;
            Ok(waveform)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_ibis::parse_ibs_file;

    const IBS: &str = r#"
[IBIS Ver] 5.1
[Component] CHIP
[Manufacturer] Test
[Package]
R_pkg 0.2 NA NA
L_pkg 1nH NA NA
C_pkg 0.5pF NA NA
[Pin] signal_name model_name
1 OUT DRV
2 IN RCV
[Model] DRV
Model_type Output
C_comp 2pF 1pF 3pF
[Voltage Range] 3.3 3.0 3.6
[Pulldown]
1.0  0.1  NA  NA
-1.0 -0.1 NA  NA
[Pullup]
-1.0 0.1  NA  NA
1.0  -0.1 NA  NA
[GND Clamp]
-1.0 -0.5 NA NA
0.0  0.0  NA NA
[Rising Waveform]
R_fixture = 50
V_fixture = 0
V_fixture_max = 0.1
1n  1.0  NA  NA
0   0.0  NA  NA
[Model] RCV
Model_type Input
Vinl = 0.8
Vinh = 2.0
[Model] NODRV
Model_type Output
[Voltage Range] 3.3 3.0 3.6
[Model] NOVCC
Model_type Output
[Pullup]
0 0 0 0
1 1 1 1
[End]
"#;

    fn doc() -> IbisFile {
        parse_ibs_file(IBS).unwrap()
    }

    #[test]
    fn test_extract_driver_model() {
        let m = extract(&doc(), "CHIP", "DRV").unwrap();
        assert_eq!(m.model_type, ModelType::Output);

        let pd = m.pulldown.as_ref().unwrap();
        assert_eq!(pd.domain(), (-1.0, 1.0));
        assert_eq!(pd.points()[0].i.typ, -0.1);
        assert!(matches!(pd.reference(), Reference::Ground(_)));

        let pu = m.pullup.as_ref().unwrap();
        assert_eq!(pu.reference().volts(Corner::Maximum), 3.6);
        assert!((pu.reference().table_voltage(Corner::Typical, 3.0) - 0.3).abs() < 1e-12);
        assert!(!pu.has_corner(Corner::Minimum));

        assert_eq!(m.rising.len(), 1);
        let wf = &m.rising[0];
        assert_eq!(wf.points()[0].t, 0.0);
        assert!((wf.duration() - 1e-9).abs() < 1e-21);
        assert_eq!(wf.v_fixture.get(Corner::Maximum), Some(0.1));
        assert_eq!(wf.v_fixture.get(Corner::Minimum), None);
        assert!(m.falling.is_empty());

        let (r, l, c) = m.package.unwrap().at(Corner::Maximum);
        assert_eq!(r, 0.2);
        assert!((l - 1e-9).abs() < 1e-21);
        assert!((c - 0.5e-12).abs() < 1e-24);
    }

    #[test]
    fn test_extract_input_model() {
        let m = extract(&doc(), "CHIP", "RCV").unwrap();
        assert!(!m.has_driver());
        assert_eq!(m.vinl, Some(0.8));
        assert_eq!(m.vinh, Some(2.0));
    }

    #[test]
    fn test_extract_not_found() {
        assert!(matches!(
            extract(&doc(), "NOPE", "DRV"),
            Err(ConvertError::NotFound { kind: "component", .. })
        ));
        assert!(matches!(
            extract(&doc(), "CHIP", "NOPE"),
            Err(ConvertError::NotFound { kind: "model", .. })
        ));
    }

    #[test]
    fn test_extract_incomplete() {
        assert!(matches!(
            extract(&doc(), "CHIP", "NODRV"),
            Err(ConvertError::IncompleteModel { .. })
        ));
        // Pull-up without a supply rail to measure from.
        assert!(matches!(
            extract(&doc(), "CHIP", "NOVCC"),
            Err(ConvertError::IncompleteModel { .. })
        ));
    }

    #[test]
    fn test_duplicate_voltage_rejected() {
        let points = vec![
            IvPoint { v: 0.0, i: Triple::uniform(0.0) },
            IvPoint { v: 0.0, i: Triple::uniform(1.0) },
        ];
        let err = IvTable::new("M", IvKind::Pulldown, Reference::Ground(Triple::uniform(0.0)), points)
            .unwrap_err();
        assert!(err.to_string().contains("pulldown table repeats voltage"));
    }
}
