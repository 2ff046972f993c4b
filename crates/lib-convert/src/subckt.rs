//! SPICE behavioural subcircuit generation.
//!
//! The subcircuit has two ports, `PIN` and the local reference `REF`. The
//! package network sits between `PIN` and the die node; the die node carries
//! `C_comp`, the switching pull-up/pull-down sources scaled by the replayed
//! K-parameters, and the unscaled clamp sources.
//!
//! The netlist is rendered to memory first so that a validation error never
//! leaves a partially written sink.

use crate::compress::{compress, CompressionStats};
use crate::error::{ConvertError, ConvertResult};
use crate::model::{DataModel, IvTable, Reference};
use crate::solver::{log_anomalies, Solver, SolverOptions};
use lib_types::{Corner, Edge, KParamSample, KParamSeries, Seconds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use tempfile::NamedTempFile;

/// Default K-parameter compression threshold.
pub const DEFAULT_THRESHOLD: f64 = 1e-6;

/// Values per continuation line in tables and PWL sources.
const ITEMS_PER_LINE: usize = 6;

/// Which side of the buffer the subcircuit models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    Input,
    Output,
    #[serde(rename = "io", alias = "i/o", alias = "inout")]
    InputOutput,
}

impl IoType {
    /// Whether the subcircuit contains the switching sources.
    pub fn drives(self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "Input",
            Self::Output => "Output",
            Self::InputOutput => "I/O",
        })
    }
}

impl FromStr for IoType {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" | "in" => Ok(Self::Input),
            "output" | "out" => Ok(Self::Output),
            "i/o" | "io" | "inout" | "input_output" => Ok(Self::InputOutput),
            _ => Err(ConvertError::unsupported_io_type(s, "expected Input, Output or I/O")),
        }
    }
}

/// Target simulator syntax.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    #[default]
    #[serde(rename = "ltspice", alias = "LTSpice", alias = "LTspice")]
    LtSpice,
    #[serde(rename = "ngspice")]
    Ngspice,
}

impl Dialect {
    /// Behavioural source function that looks up an `(x, y)` table.
    fn table_function(self) -> &'static str {
        match self {
            Self::LtSpice => "table",
            Self::Ngspice => "pwl",
        }
    }

    /// Opening and closing text of a PWL voltage source.
    fn pwl_delimiters(self, repeat: bool) -> (&'static str, &'static str) {
        match (self, repeat) {
            (Self::LtSpice, true) => ("PWL REPEAT FOREVER (", ") ENDREPEAT"),
            (Self::Ngspice, true) => ("PWL(", ") r=0"),
            (_, false) => ("PWL(", ")"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LtSpice => "LTSpice",
            Self::Ngspice => "ngspice",
        })
    }
}

impl FromStr for Dialect {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ltspice" | "lt" => Ok(Self::LtSpice),
            "ngspice" | "ng" => Ok(Self::Ngspice),
            _ => Err(ConvertError::UnsupportedDialect(s.to_string())),
        }
    }
}

/// Stimulus timeline replayed by the K-parameter sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stimulus {
    /// Start of the rising edge.
    pub delay: Seconds,
    /// Time from the start of the rising edge to the start of the falling
    /// edge. Defaults to the rising edge duration.
    pub high_time: Option<Seconds>,
    /// Repeat period of the whole timeline.
    pub period: Option<Seconds>,
}

/// Generation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    pub threshold: f64,
    pub stimulus: Stimulus,
    pub solver: SolverOptions,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            stimulus: Stimulus::default(),
            solver: SolverOptions::default(),
        }
    }
}

/// Pre-computed (compressed) K-parameter series per edge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KParamsByEdge {
    pub rising: Option<KParamSeries>,
    pub falling: Option<KParamSeries>,
}

impl KParamsByEdge {
    pub fn get(&self, edge: Edge) -> Option<&KParamSeries> {
        match edge {
            Edge::Rising => self.rising.as_ref(),
            Edge::Falling => self.falling.as_ref(),
        }
    }
}

/// One edge solved at the generator's corner and compressed.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedEdge {
    pub series: KParamSeries,
    pub stats: CompressionStats,
    pub anomalies: usize,
}

/// Subcircuit generator for one io type, dialect and corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Generator {
    pub io_type: IoType,
    pub dialect: Dialect,
    pub corner: Corner,
    pub options: GenerateOptions,
}

/// Switching drive: per-edge sample counts and the replay timeline.
struct Drive {
    rising_samples: usize,
    falling_samples: usize,
    timeline: Vec<KParamSample>,
}

impl Generator {
    pub fn new(io_type: IoType, dialect: Dialect, corner: Corner) -> Self {
        Self {
            io_type,
            dialect,
            corner,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Render and write the subcircuit. Nothing is written on error.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        model: &DataModel,
        kparams: &KParamsByEdge,
        sink: &mut W,
    ) -> ConvertResult<()> {
        let text = self.render(model, kparams)?;
        sink.write_all(&text)?;
        sink.flush()?;
        Ok(())
    }

    /// Render the subcircuit text.
    pub fn render(&self, model: &DataModel, kparams: &KParamsByEdge) -> ConvertResult<Vec<u8>> {
        self.validate(model)?;
        let drive = if self.io_type.drives() {
            Some(self.drive(model, kparams)?)
        } else {
            None
        };
        let mut out = Vec::new();
        self.write_netlist(&mut out, model, drive.as_ref())?;
        Ok(out)
    }

    fn validate(&self, model: &DataModel) -> ConvertResult<()> {
        let model_type = model.model_type;
        if !model_type.is_convertible() {
            return Err(ConvertError::unsupported_io_type(
                self.io_type,
                format!(
                    "model '{}' is of type {}, which has no single-ended buffer equivalent",
                    model.model,
                    model_type.ibis_name()
                ),
            ));
        }
        if self.io_type.drives() && !model_type.is_driver() {
            return Err(ConvertError::unsupported_io_type(
                self.io_type,
                format!("model '{}' of type {} cannot drive", model.model, model_type.ibis_name()),
            ));
        }
        if self.io_type == IoType::InputOutput && !model_type.is_receiver() {
            return Err(ConvertError::unsupported_io_type(
                self.io_type,
                format!("model '{}' of type {} cannot receive", model.model, model_type.ibis_name()),
            ));
        }
        if self.io_type.drives() && !model.has_driver() {
            return Err(ConvertError::incomplete(
                model.model.as_str(),
                "no [Pullup] or [Pulldown] table",
            ));
        }
        Ok(())
    }

    fn drive(&self, model: &DataModel, kparams: &KParamsByEdge) -> ConvertResult<Drive> {
        let rising = self.edge_series(model, Edge::Rising, kparams)?;
        let falling = self.edge_series(model, Edge::Falling, kparams)?;
        let timeline = build_timeline(&rising, &falling, &self.options.stimulus)?;
        Ok(Drive {
            rising_samples: rising.len(),
            falling_samples: falling.len(),
            timeline,
        })
    }

    /// Supplied series for `edge`, or solve and compress it.
    fn edge_series(&self, model: &DataModel, edge: Edge, kparams: &KParamsByEdge) -> ConvertResult<KParamSeries> {
        if let Some(series) = kparams.get(edge) {
            if series.len() < 2 {
                return Err(ConvertError::invalid_argument(
                    "kparams",
                    format!("{} series needs at least two samples", edge),
                ));
            }
            return Ok(series.clone());
        }
        self.solve_edge(model, edge).map(|solved| solved.series)
    }

    /// Solve `edge` at this generator's corner and compress the series.
    pub fn solve_edge(&self, model: &DataModel, edge: Edge) -> ConvertResult<SolvedEdge> {
        let solution = Solver::new(self.options.solver).solve_detailed(model, self.corner, edge)?;
        log_anomalies(model, self.corner, edge, &solution.anomalies);
        let series = compress(&solution.series, self.options.threshold)?;
        Ok(SolvedEdge {
            stats: CompressionStats::new(&solution.series, &series),
            anomalies: solution.anomalies.len(),
            series,
        })
    }

    fn write_netlist(&self, out: &mut Vec<u8>, model: &DataModel, drive: Option<&Drive>) -> io::Result<()> {
        let name = sanitize_name(&model.model);
        let corner = self.corner;

        writeln!(out, "* {} behavioural model", name)?;
        writeln!(out, "* Generated by ibis2spice {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "* Component: {}", model.component)?;
        writeln!(out, "* Model: {} ({})", model.model, model.model_type.ibis_name())?;
        writeln!(out, "* Corner: {}", corner)?;
        writeln!(out, "* Dialect: {}", self.dialect)?;
        writeln!(out, "* I/O type: {}", self.io_type)?;
        let tables: Vec<&str> = model.tables().map(|t| t.kind().label()).collect();
        if !tables.is_empty() {
            writeln!(out, "* I-V tables: {}", tables.join(", "))?;
        }
        if let Some(temp) = model.temperature_range {
            writeln!(out, "* Temperature: {} C", num(temp.resolve(corner)))?;
        }
        if let Some(drive) = drive {
            let stimulus = &self.options.stimulus;
            writeln!(out, "* Compression threshold: {}", num(self.options.threshold))?;
            writeln!(out, "* Rising K-parameter samples: {}", drive.rising_samples)?;
            writeln!(out, "* Falling K-parameter samples: {}", drive.falling_samples)?;
            write!(out, "* Stimulus: delay={}s", num(stimulus.delay.0))?;
            if let Some(high) = stimulus.high_time {
                write!(out, " high_time={}s", num(high.0))?;
            }
            if let Some(period) = stimulus.period {
                write!(out, " period={}s", num(period.0))?;
            }
            writeln!(out)?;
        }
        writeln!(out, ".SUBCKT {} PIN REF", name)?;

        let die = self.write_package(out, model)?;

        let c_comp = model.c_comp.map_or(0.0, |c| c.resolve(corner));
        if c_comp != 0.0 {
            writeln!(out, "C_COMP {} REF {}", die, num(c_comp))?;
        } else {
            writeln!(out, "* No C_comp given")?;
        }

        if let Some(drive) = drive {
            writeln!(out, "* Switching coefficients")?;
            let repeat = self.options.stimulus.period.is_some();
            if model.pullup.is_some() {
                let ku: Vec<(f64, f64)> = drive.timeline.iter().map(|s| (s.t, s.ku)).collect();
                self.write_pwl(out, "V_KU KU REF", &ku, repeat)?;
            }
            if model.pulldown.is_some() {
                let kd: Vec<(f64, f64)> = drive.timeline.iter().map(|s| (s.t, s.kd)).collect();
                self.write_pwl(out, "V_KD KD REF", &kd, repeat)?;
            }
            writeln!(out, "* Driver devices")?;
            if let Some(table) = &model.pullup {
                self.write_source(out, "B_PULLUP", die, Some("KU"), model, table)?;
            }
            if let Some(table) = &model.pulldown {
                self.write_source(out, "B_PULLDOWN", die, Some("KD"), model, table)?;
            }
        }

        if model.power_clamp.is_some() || model.gnd_clamp.is_some() {
            writeln!(out, "* Clamps")?;
        }
        if let Some(table) = &model.power_clamp {
            self.write_source(out, "B_PWR_CLAMP", die, None, model, table)?;
        }
        if let Some(table) = &model.gnd_clamp {
            self.write_source(out, "B_GND_CLAMP", die, None, model, table)?;
        }

        if self.io_type != IoType::Output {
            if let Some(vinl) = model.vinl {
                writeln!(out, "* Vinl = {} V", num(vinl))?;
            }
            if let Some(vinh) = model.vinh {
                writeln!(out, "* Vinh = {} V", num(vinh))?;
            }
        }

        writeln!(out, ".ENDS {}", name)
    }

    /// Emit the package network and return the die node name.
    fn write_package(&self, out: &mut Vec<u8>, model: &DataModel) -> io::Result<&'static str> {
        let (r, l, c) = model.package.map(|p| p.at(self.corner)).unwrap_or_default();
        if r == 0.0 && l == 0.0 && c == 0.0 {
            return Ok("PIN");
        }
        writeln!(out, "* Package parasitics")?;
        let die = match (r != 0.0, l != 0.0) {
            (true, true) => {
                writeln!(out, "R_PKG PIN PKG {}", num(r))?;
                writeln!(out, "L_PKG PKG DIE {}", num(l))?;
                "DIE"
            }
            (true, false) => {
                writeln!(out, "R_PKG PIN DIE {}", num(r))?;
                "DIE"
            }
            (false, true) => {
                writeln!(out, "L_PKG PIN DIE {}", num(l))?;
                "DIE"
            }
            (false, false) => "PIN",
        };
        if c != 0.0 {
            writeln!(out, "C_PKG PIN REF {}", num(c))?;
        }
        Ok(die)
    }

    fn write_source(
        &self,
        out: &mut Vec<u8>,
        element: &str,
        die: &str,
        scale: Option<&str>,
        model: &DataModel,
        table: &IvTable,
    ) -> io::Result<()> {
        if !table.has_corner(self.corner) {
            tracing::debug!(
                "Model {} {} table has NA entries at {} corner, using typical",
                model.model,
                table.kind().label(),
                self.corner
            );
        }
        let axis = axis_expression(table.reference(), self.corner, die);
        let factor = scale.map_or(String::new(), |node| format!("V({},REF)*", node));
        let head = format!(
            "{} {} REF I={}{}({},",
            element,
            die,
            factor,
            self.dialect.table_function(),
            axis
        );
        let column = table.column(self.corner);
        let items: Vec<String> = column
            .iter()
            .enumerate()
            .map(|(idx, &(v, i))| {
                let sep = if idx + 1 < column.len() { "," } else { "" };
                format!("{},{}{}", num(v), num(i), sep)
            })
            .collect();
        write_wrapped(out, &head, &items, ")")
    }

    fn write_pwl(&self, out: &mut Vec<u8>, element: &str, points: &[(f64, f64)], repeat: bool) -> io::Result<()> {
        let (open, close) = self.dialect.pwl_delimiters(repeat);
        let items: Vec<String> = points
            .iter()
            .map(|&(t, k)| format!("{} {}", num(t), num(k)))
            .collect();
        write_wrapped(out, &format!("{} {}", element, open), &items, close)
    }
}

/// Generate a subcircuit with default options.
pub fn generate<W: Write + ?Sized>(
    io_type: IoType,
    dialect: Dialect,
    model: &DataModel,
    corner: Corner,
    kparams: &KParamsByEdge,
    sink: &mut W,
) -> ConvertResult<()> {
    Generator::new(io_type, dialect, corner).write_to(model, kparams, sink)
}

/// Write a subcircuit file atomically: the text goes to a temporary file in
/// the destination directory that is renamed into place only on success.
pub fn write_subcircuit_file(
    path: impl AsRef<Path>,
    generator: &Generator,
    model: &DataModel,
    kparams: &KParamsByEdge,
) -> ConvertResult<()> {
    let path = path.as_ref();
    let text = generator.render(model, kparams)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&text)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ConvertError::SinkWrite(e.error))?;

    tracing::info!("Wrote {} ({} bytes)", path.display(), text.len());
    Ok(())
}

/// Subcircuit name: characters outside `[A-Za-z0-9_]` become `_` and a
/// leading digit gets an `M_` prefix.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    match cleaned.chars().next() {
        None => "MODEL".to_string(),
        Some(c) if c.is_ascii_digit() => format!("M_{}", cleaned),
        Some(_) => cleaned,
    }
}

/// Replay timeline: low from t=0, rising edge at `delay`, falling edge at
/// `delay + high_time`, optionally padded to `period`.
pub fn build_timeline(
    rising: &KParamSeries,
    falling: &KParamSeries,
    stimulus: &Stimulus,
) -> ConvertResult<Vec<KParamSample>> {
    let delay = stimulus.delay.0;
    if !(delay.is_finite() && delay >= 0.0) {
        return Err(ConvertError::invalid_argument(
            "delay",
            format!("must be a non-negative time, got {}", delay),
        ));
    }
    let rise = rising.duration().0;
    let fall = falling.duration().0;
    let high = match stimulus.high_time {
        Some(h) if !(h.0.is_finite() && h.0 >= rise) => {
            return Err(ConvertError::invalid_argument(
                "high_time",
                format!("{:e}s is shorter than the rising edge ({:e}s)", h.0, rise),
            ));
        }
        Some(h) => h.0,
        None => rise,
    };

    let (low_ku, low_kd) = Edge::Rising.initial_state();
    let mut points = vec![KParamSample::new(0.0, low_ku, low_kd)];
    append_series(&mut points, rising, delay);
    append_series(&mut points, falling, delay + high);

    if let Some(period) = stimulus.period {
        let end = delay + high + fall;
        if !(period.0.is_finite() && period.0 >= end) {
            return Err(ConvertError::invalid_argument(
                "period",
                format!("{:e}s is shorter than the stimulus ({:e}s)", period.0, end),
            ));
        }
        push_point(&mut points, KParamSample::new(period.0, low_ku, low_kd));
    }
    Ok(points)
}

fn append_series(points: &mut Vec<KParamSample>, series: &KParamSeries, start: f64) {
    let Some(first) = series.first() else {
        return;
    };
    let t0 = first.t;
    for s in series {
        push_point(points, KParamSample::new(start + (s.t - t0), s.ku, s.kd));
    }
}

/// Append a point; a point at or before the last time replaces it.
fn push_point(points: &mut Vec<KParamSample>, sample: KParamSample) {
    match points.last_mut() {
        Some(last) if sample.t <= last.t => {
            last.ku = sample.ku;
            last.kd = sample.kd;
        }
        _ => points.push(sample),
    }
}

/// Table-axis voltage as a behavioural expression of the die voltage.
fn axis_expression(reference: &Reference, corner: Corner, die: &str) -> String {
    let r = reference.volts(corner);
    match reference {
        Reference::Ground(_) if r == 0.0 => format!("V({},REF)", die),
        Reference::Ground(_) => format!("V({},REF)-({})", die, num(r)),
        Reference::Supply(_) => format!("({})-V({},REF)", num(r), die),
    }
}

/// Shortest round-trip exponent form, e.g. `1.5e-9`.
fn num(x: f64) -> String {
    if x == 0.0 {
        "0".to_string()
    } else {
        format!("{:e}", x)
    }
}

fn write_wrapped(out: &mut Vec<u8>, head: &str, items: &[String], tail: &str) -> io::Result<()> {
    writeln!(out, "{}", head)?;
    for chunk in items.chunks(ITEMS_PER_LINE) {
        writeln!(out, "+ {}", chunk.join(" "))?;
    }
    writeln!(out, "+ {}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use lib_ibis::ModelType;

    fn render(generator: &Generator, model: &DataModel) -> String {
        let bytes = generator.render(model, &KParamsByEdge::default()).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("DQ_40ohm"), "DQ_40ohm");
        assert_eq!(sanitize_name("io-33.v2"), "io_33_v2");
        assert_eq!(sanitize_name("3v3_out"), "M_3v3_out");
        assert_eq!(sanitize_name(""), "MODEL");
    }

    #[test]
    fn test_parse_io_type_and_dialect() {
        assert_eq!("I/O".parse::<IoType>().unwrap(), IoType::InputOutput);
        assert_eq!("output".parse::<IoType>().unwrap(), IoType::Output);
        assert_eq!("LTSpice".parse::<Dialect>().unwrap(), Dialect::LtSpice);
        assert_eq!("ngspice".parse::<Dialect>().unwrap(), Dialect::Ngspice);
        assert!(matches!(
            "hspice".parse::<Dialect>(),
            Err(ConvertError::UnsupportedDialect(_))
        ));
        assert!(matches!(
            "bidir".parse::<IoType>(),
            Err(ConvertError::UnsupportedIoType { .. })
        ));
    }

    #[test]
    fn test_zero_package_omits_network() {
        let model = fixtures::linear_model();
        let text = render(&Generator::new(IoType::Output, Dialect::LtSpice, Corner::Typical), &model);

        assert!(text.contains(".SUBCKT LIN_OUT PIN REF"));
        assert!(!text.contains("R_PKG"));
        assert!(!text.contains("L_PKG"));
        assert!(!text.contains("C_PKG"));
        assert!(!text.contains("Package"));
        assert!(text.contains("C_COMP PIN REF 1e-12"));
        assert!(text.contains("B_PULLUP PIN REF I=V(KU,REF)*table(V(PIN,REF),"));
        assert!(text.contains("B_PULLDOWN PIN REF I=V(KD,REF)*table(V(PIN,REF),"));
        assert!(text.contains("V_KU KU REF PWL("));
        assert!(text.contains("V_KD KD REF PWL("));
        assert!(text.trim_end().ends_with(".ENDS LIN_OUT"));
    }

    #[test]
    fn test_package_network_and_supply_axis() {
        let model = fixtures::driver_model(&[0.0, 5.0]);
        let text = render(&Generator::new(IoType::Output, Dialect::Ngspice, Corner::Typical), &model);

        assert!(text.contains("R_PKG PIN PKG 2.5e-1"));
        assert!(text.contains("L_PKG PKG DIE 2e-9"));
        assert!(text.contains("C_PKG PIN REF 5e-13"));
        assert!(text.contains("C_COMP DIE REF 2e-12"));
        assert!(text.contains("B_PULLUP DIE REF I=V(KU,REF)*pwl((5e0)-V(DIE,REF),"));
        assert!(text.contains("B_GND_CLAMP DIE REF I=pwl(V(DIE,REF),"));
        assert!(!text.contains("REPEAT"));
    }

    #[test]
    fn test_tables_reproduce_iv_pairs() {
        let model = fixtures::linear_model();
        let text = render(&Generator::new(IoType::Output, Dialect::LtSpice, Corner::Typical), &model);
        for (v, i) in model.pulldown.as_ref().unwrap().column(Corner::Typical) {
            assert!(text.contains(&format!("{},{}", num(v), num(i))), "missing {} {}", v, i);
        }
        for line in text.lines().filter(|l| l.starts_with('+') && l.contains(',')) {
            assert!(line.split_whitespace().count() <= ITEMS_PER_LINE + 1);
        }
    }

    #[test]
    fn test_unsupported_io_type_writes_nothing() {
        let model = fixtures::input_model();
        let mut sink = Vec::new();
        let err = generate(
            IoType::Output,
            Dialect::LtSpice,
            &model,
            Corner::Typical,
            &KParamsByEdge::default(),
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedIoType { .. }));
        assert!(sink.is_empty());

        let mut term = fixtures::input_model();
        term.model_type = ModelType::Terminator;
        let err = generate(
            IoType::Input,
            Dialect::LtSpice,
            &term,
            Corner::Typical,
            &KParamsByEdge::default(),
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedIoType { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_missing_falling_edge_fails_before_writing() {
        let mut model = fixtures::linear_model();
        model.falling.clear();
        let mut sink = Vec::new();
        let err = generate(
            IoType::Output,
            Dialect::LtSpice,
            &model,
            Corner::Typical,
            &KParamsByEdge::default(),
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::NoWaveform { edge: Edge::Falling, .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_input_model() {
        let model = fixtures::input_model();
        let text = render(&Generator::new(IoType::Input, Dialect::LtSpice, Corner::Typical), &model);
        assert!(text.contains("C_COMP PIN REF"));
        assert!(text.contains("B_PWR_CLAMP PIN REF I=table((5e0)-V(PIN,REF),"));
        assert!(text.contains("* Vinl = 8e-1 V"));
        assert!(text.contains("* Vinh = 2e0 V"));
        assert!(text.contains("* I-V tables: power_clamp, gnd_clamp"));
        assert!(!text.contains("V_KU"));
        assert!(!text.contains("B_PULLUP"));
    }

    #[test]
    fn test_supplied_kparams_are_used() {
        let model = fixtures::linear_model();
        let edge = |ku0: f64| {
            KParamSeries::try_new(vec![
                KParamSample::new(0.0, ku0, 1.0 - ku0),
                KParamSample::new(2e-9, 1.0 - ku0, ku0),
            ]).unwrap()
        };
        let kparams = KParamsByEdge {
            rising: Some(edge(0.0)),
            falling: Some(edge(1.0)),
        };
        let bytes = Generator::new(IoType::Output, Dialect::LtSpice, Corner::Typical)
            .render(&model, &kparams)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("* Rising K-parameter samples: 2"));
        assert!(text.contains("* Falling K-parameter samples: 2"));
    }

    #[test]
    fn test_timeline() {
        let rise = KParamSeries::try_new(vec![
            KParamSample::new(0.0, 0.0, 1.0),
            KParamSample::new(1e-9, 0.5, 0.5),
            KParamSample::new(2e-9, 1.0, 0.0),
        ]).unwrap();
        let fall = KParamSeries::try_new(vec![
            KParamSample::new(0.0, 1.0, 0.0),
            KParamSample::new(3e-9, 0.0, 1.0),
        ]).unwrap();

        let stimulus = Stimulus {
            delay: Seconds::from_ns(1.0),
            high_time: Some(Seconds::from_ns(5.0)),
            period: Some(Seconds::from_ns(20.0)),
        };
        let points = build_timeline(&rise, &fall, &stimulus).unwrap();
        let times: Vec<f64> = points.iter().map(|p| p.t * 1e9).collect();
        let expected = [0.0, 1.0, 2.0, 3.0, 6.0, 9.0, 20.0];
        assert_eq!(times.len(), expected.len());
        for (t, e) in times.iter().zip(expected) {
            assert!((t - e).abs() < 1e-6, "{:?}", times);
        }
        assert!(points.windows(2).all(|w| w[1].t > w[0].t));
        assert_eq!((points[0].ku, points[0].kd), (0.0, 1.0));
        assert_eq!((points[3].ku, points[3].kd), (1.0, 0.0));

        // Zero delay and default high time: shared instants collapse.
        let points = build_timeline(&rise, &fall, &Stimulus::default()).unwrap();
        assert_eq!(points.len(), 4);
        assert!((points[3].t - 5e-9).abs() < 1e-18);

        let short = Stimulus {
            high_time: Some(Seconds::from_ns(1.0)),
            ..Default::default()
        };
        assert!(matches!(
            build_timeline(&rise, &fall, &short),
            Err(ConvertError::InvalidArgument { name: "high_time", .. })
        ));
        let short = Stimulus {
            period: Some(Seconds::from_ns(4.0)),
            ..Default::default()
        };
        assert!(matches!(
            build_timeline(&rise, &fall, &short),
            Err(ConvertError::InvalidArgument { name: "period", .. })
        ));
    }

    #[test]
    fn test_repeat_syntax() {
        let model = fixtures::linear_model();
        let mut options = GenerateOptions::default();
        options.stimulus.period = Some(Seconds::from_ns(50.0));

        let lt = render(
            &Generator::new(IoType::Output, Dialect::LtSpice, Corner::Typical).with_options(options),
            &model,
        );
        assert!(lt.contains("V_KU KU REF PWL REPEAT FOREVER ("));
        assert!(lt.contains("+ ) ENDREPEAT"));

        let ng = render(
            &Generator::new(IoType::Output, Dialect::Ngspice, Corner::Typical).with_options(options),
            &model,
        );
        assert!(ng.contains("+ ) r=0"));
    }

    /// Writer whose every write fails.
    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unwritable_sink_is_sink_write() {
        let model = fixtures::input_model();
        let err = generate(
            IoType::Input,
            Dialect::LtSpice,
            &model,
            Corner::Typical,
            &KParamsByEdge::default(),
            &mut ClosedSink,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::SinkWrite(ref e) if e.kind() == io::ErrorKind::BrokenPipe));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("rcv.sub");
        let generator = Generator::new(IoType::Input, Dialect::LtSpice, Corner::Typical);
        let err = write_subcircuit_file(&path, &generator, &model, &KParamsByEdge::default()).unwrap_err();
        assert!(matches!(err, ConvertError::SinkWrite(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_file_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lin.sub");
        let model = fixtures::linear_model();

        let ok = Generator::new(IoType::Output, Dialect::LtSpice, Corner::Typical);
        write_subcircuit_file(&path, &ok, &model, &KParamsByEdge::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(".ENDS LIN_OUT"));

        let failing_path = dir.path().join("bad.sub");
        let input = fixtures::input_model();
        assert!(write_subcircuit_file(&failing_path, &ok, &input, &KParamsByEdge::default()).is_err());
        assert!(!failing_path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
