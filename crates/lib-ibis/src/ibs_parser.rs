//! IBIS (.ibs) file parser.
//!
//! Parses IBIS I/O buffer model files according to the IBIS 5.x/7.x
//! specification. This is a partial implementation covering the keywords
//! needed to turn a single-ended buffer into a behavioural SPICE model:
//! header, `[Component]` with `[Package]` and `[Pin]`, and `[Model]` with its
//! ranges, references, I-V tables and V-T waveforms. Keywords outside that
//! set are skipped.
//!
//! Reference: IBIS Specification Version 7.2

use crate::error::ParseError;
use lib_types::Triple;
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{alpha0, char},
    combinator::{all_consuming, opt, value},
    number::complete::double,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};

/// Parsed IBIS file.
#[derive(Clone, Debug, Default)]
pub struct IbisFile {
    /// File header information.
    pub header: IbisHeader,

    /// Component definitions.
    pub components: Vec<Component>,

    /// Model definitions.
    pub models: Vec<Model>,
}

impl IbisFile {
    /// Look up a component by exact name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Look up a model by exact name.
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }
}

/// IBIS file header section.
#[derive(Clone, Debug, Default)]
pub struct IbisHeader {
    /// IBIS version.
    pub ibis_ver: String,

    /// File name.
    pub file_name: String,

    /// File revision.
    pub file_rev: String,

    /// Date.
    pub date: String,

    /// Source (vendor name).
    pub source: String,

    /// Notes.
    pub notes: String,

    /// Disclaimer.
    pub disclaimer: String,

    /// Copyright.
    pub copyright: String,
}

/// Component definition.
#[derive(Clone, Debug, Default)]
pub struct Component {
    /// Component name.
    pub name: String,

    /// Manufacturer.
    pub manufacturer: String,

    /// Package information.
    pub package: Option<Package>,

    /// Pin definitions.
    pub pins: Vec<Pin>,
}

/// Package parasitics.
#[derive(Clone, Debug, Default)]
pub struct Package {
    /// R_pkg in Ohms.
    pub r_pkg: Option<Triple<f64>>,

    /// L_pkg in Henries.
    pub l_pkg: Option<Triple<f64>>,

    /// C_pkg in Farads.
    pub c_pkg: Option<Triple<f64>>,
}

/// Pin definition.
#[derive(Clone, Debug, Default)]
pub struct Pin {
    /// Pin name/number.
    pub name: String,

    /// Signal name.
    pub signal_name: String,

    /// Associated model name.
    pub model_name: String,

    /// R_pin (optional).
    pub r_pin: Option<f64>,

    /// L_pin (optional).
    pub l_pin: Option<f64>,

    /// C_pin (optional).
    pub c_pin: Option<f64>,
}

/// I/O buffer model.
#[derive(Clone, Debug, Default)]
pub struct Model {
    /// Model name.
    pub name: String,

    /// Model type.
    pub model_type: ModelType,

    /// Die capacitance (typical, min, max) in Farads.
    pub c_comp: Option<Triple<f64>>,

    /// Voltage range (typical, min, max).
    pub voltage_range: Option<Triple<f64>>,

    /// Temperature range (typical, min, max).
    pub temperature_range: Option<Triple<f64>>,

    /// Pull-up reference voltage.
    pub pullup_reference: Option<Triple<f64>>,

    /// Pull-down reference voltage.
    pub pulldown_reference: Option<Triple<f64>>,

    /// Power clamp reference voltage.
    pub power_clamp_reference: Option<Triple<f64>>,

    /// Ground clamp reference voltage.
    pub gnd_clamp_reference: Option<Triple<f64>>,

    /// Input low threshold.
    pub vinl: Option<f64>,

    /// Input high threshold.
    pub vinh: Option<f64>,

    /// Pullup I-V table.
    pub pullup: Option<IVTable>,

    /// Pulldown I-V table.
    pub pulldown: Option<IVTable>,

    /// Power clamp I-V table.
    pub power_clamp: Option<IVTable>,

    /// Ground clamp I-V table.
    pub gnd_clamp: Option<IVTable>,

    /// Rising waveform tables.
    pub rising_waveform: Vec<WaveformTable>,

    /// Falling waveform tables.
    pub falling_waveform: Vec<WaveformTable>,
}

/// Model type enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[default]
    Input,
    Output,
    IO,
    ThreeState,
    OpenDrain,
    OpenSink,
    OpenSource,
    IOOpenDrain,
    IOOpenSink,
    IOOpenSource,
    InputECL,
    OutputECL,
    IOECL,
    ThreeStateECL,
    Terminator,
    Series,
    SeriesSwitch,
    /// A model type this parser does not know (differential, digital-only, ...).
    Other,
}

impl ModelType {
    /// Parse the `Model_type` sub-parameter value.
    pub fn from_ibis(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            "i/o" | "io" => Some(Self::IO),
            "3-state" | "three-state" => Some(Self::ThreeState),
            "open_drain" => Some(Self::OpenDrain),
            "open_sink" => Some(Self::OpenSink),
            "open_source" => Some(Self::OpenSource),
            "i/o_open_drain" => Some(Self::IOOpenDrain),
            "i/o_open_sink" => Some(Self::IOOpenSink),
            "i/o_open_source" => Some(Self::IOOpenSource),
            "input_ecl" => Some(Self::InputECL),
            "output_ecl" => Some(Self::OutputECL),
            "i/o_ecl" | "io_ecl" => Some(Self::IOECL),
            "3-state_ecl" => Some(Self::ThreeStateECL),
            "terminator" => Some(Self::Terminator),
            "series" => Some(Self::Series),
            "series_switch" => Some(Self::SeriesSwitch),
            _ => None,
        }
    }

    /// The keyword spelling used in IBIS files.
    pub fn ibis_name(self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output => "Output",
            Self::IO => "I/O",
            Self::ThreeState => "3-state",
            Self::OpenDrain => "Open_drain",
            Self::OpenSink => "Open_sink",
            Self::OpenSource => "Open_source",
            Self::IOOpenDrain => "I/O_open_drain",
            Self::IOOpenSink => "I/O_open_sink",
            Self::IOOpenSource => "I/O_open_source",
            Self::InputECL => "Input_ECL",
            Self::OutputECL => "Output_ECL",
            Self::IOECL => "I/O_ECL",
            Self::ThreeStateECL => "3-state_ECL",
            Self::Terminator => "Terminator",
            Self::Series => "Series",
            Self::SeriesSwitch => "Series_switch",
            Self::Other => "Other",
        }
    }

    /// Models that actively drive the pin through pull-up/pull-down devices.
    pub fn is_driver(self) -> bool {
        matches!(
            self,
            Self::Output
                | Self::IO
                | Self::ThreeState
                | Self::OpenDrain
                | Self::OpenSink
                | Self::OpenSource
                | Self::IOOpenDrain
                | Self::IOOpenSink
                | Self::IOOpenSource
                | Self::OutputECL
                | Self::IOECL
                | Self::ThreeStateECL
        )
    }

    /// Models that also act as receivers.
    pub fn is_receiver(self) -> bool {
        matches!(
            self,
            Self::Input
                | Self::IO
                | Self::IOOpenDrain
                | Self::IOOpenSink
                | Self::IOOpenSource
                | Self::InputECL
                | Self::IOECL
        )
    }

    /// Models that can be expressed as a single-ended behavioural buffer.
    pub fn is_convertible(self) -> bool {
        self.is_driver() || self.is_receiver()
    }
}

/// One row of an I-V or V-T table: the independent variable and the
/// `(typ, min, max)` dependent columns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableRow {
    pub x: f64,
    pub values: Triple<f64>,
}

/// I-V table data.
#[derive(Clone, Debug, Default)]
pub struct IVTable {
    /// (Voltage, I_typical, I_min, I_max) rows in file order.
    pub points: Vec<TableRow>,
}

/// Waveform table (V-T data).
#[derive(Clone, Debug, Default)]
pub struct WaveformTable {
    /// R_fixture value.
    pub r_fixture: Option<f64>,

    /// V_fixture value.
    pub v_fixture: Option<f64>,

    /// V_fixture_min (optional).
    pub v_fixture_min: Option<f64>,

    /// V_fixture_max (optional).
    pub v_fixture_max: Option<f64>,

    /// C_fixture (optional).
    pub c_fixture: Option<f64>,

    /// L_fixture (optional).
    pub l_fixture: Option<f64>,

    /// (Time, V_typical, V_min, V_max) rows in file order.
    pub points: Vec<TableRow>,
}

/// Parse an IBIS file from a string.
pub fn parse_ibs_file(content: &str) -> Result<IbisFile, ParseError> {
    let mut parser = IbsParser::new();
    for (idx, line) in content.lines().enumerate() {
        parser
            .feed_line(line)
            .map_err(|e| e.at_line(idx + 1))?;
        if parser.ended {
            break;
        }
    }
    let file = parser.finish()?;
    tracing::debug!(
        components = file.components.len(),
        models = file.models.len(),
        "Parsed IBIS file '{}'",
        file.header.file_name
    );
    Ok(file)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Section {
    None,
    Header(HeaderField),
    Component,
    Model,
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum HeaderField {
    IbisVer,
    FileName,
    FileRev,
    Date,
    Source,
    Notes,
    Disclaimer,
    Copyright,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TableType {
    Package,
    Pin,
    Pullup,
    Pulldown,
    PowerClamp,
    GndClamp,
    RisingWaveform,
    FallingWaveform,
    Ignored,
}

struct IbsParser {
    file: IbisFile,
    comment_char: char,
    section: Section,
    component: Option<Component>,
    model: Option<Model>,
    model_type_seen: bool,
    table: Option<TableType>,
    pin_has_rlc: bool,
    ended: bool,
}

impl IbsParser {
    fn new() -> Self {
        Self {
            file: IbisFile::default(),
            comment_char: '|',
            section: Section::None,
            component: None,
            model: None,
            model_type_seen: false,
            table: None,
            pin_has_rlc: false,
            ended: false,
        }
    }

    fn feed_line(&mut self, raw: &str) -> Result<(), ParseError> {
        let trimmed = raw.trim();
        if let Some(c) = comment_char_override(trimmed) {
            self.comment_char = c?;
            return Ok(());
        }

        let line = match trimmed.find(self.comment_char) {
            Some(idx) => trimmed[..idx].trim(),
            None => trimmed,
        };
        if line.is_empty() {
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix('[') {
            let (keyword, tail) = rest
                .split_once(']')
                .ok_or_else(|| ParseError::invalid_value("keyword", "missing closing ']'"))?;
            return self.keyword(&normalize_keyword(keyword), tail.trim());
        }

        match self.section {
            Section::Header(field) => {
                self.append_header(field, line);
                Ok(())
            }
            Section::Component => self.component_row(line),
            Section::Model => self.model_row(line),
            Section::None | Section::Skip => Ok(()),
        }
    }

    fn keyword(&mut self, keyword: &str, tail: &str) -> Result<(), ParseError> {
        let header = match keyword {
            "ibis ver" => Some(HeaderField::IbisVer),
            "file name" => Some(HeaderField::FileName),
            "file rev" => Some(HeaderField::FileRev),
            "date" => Some(HeaderField::Date),
            "source" => Some(HeaderField::Source),
            "notes" => Some(HeaderField::Notes),
            "disclaimer" => Some(HeaderField::Disclaimer),
            "copyright" => Some(HeaderField::Copyright),
            _ => None,
        };
        if let Some(field) = header {
            self.flush()?;
            self.section = Section::Header(field);
            if !tail.is_empty() {
                self.append_header(field, tail);
            }
            return Ok(());
        }

        match keyword {
            "component" => {
                self.flush()?;
                if tail.is_empty() {
                    return Err(ParseError::missing_keyword("[Component] name"));
                }
                self.component = Some(Component {
                    name: tail.to_string(),
                    ..Default::default()
                });
                self.section = Section::Component;
            }
            "model" => {
                self.flush()?;
                let name = tail
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| ParseError::missing_keyword("[Model] name"))?;
                self.model = Some(Model {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.model_type_seen = false;
                self.section = Section::Model;
            }
            "end" => {
                self.flush()?;
                self.ended = true;
            }
            "model selector" | "submodel" | "define package model" | "end package model"
            | "external circuit" | "interconnect model set" | "begin board description"
            | "end board description" => {
                self.flush()?;
                tracing::debug!("Skipping unsupported top-level keyword [{}]", keyword);
                self.section = Section::Skip;
            }
            _ => match self.section {
                Section::Component => self.component_keyword(keyword, tail),
                Section::Model => self.model_keyword(keyword, tail)?,
                _ => {
                    tracing::debug!("Ignoring keyword [{}] outside a component or model", keyword);
                    self.section = Section::Skip;
                }
            },
        }
        self.table = match self.section {
            Section::Component | Section::Model => self.table,
            _ => None,
        };
        Ok(())
    }

    fn component_keyword(&mut self, keyword: &str, tail: &str) {
        let Some(comp) = self.component.as_mut() else {
            return;
        };
        self.table = match keyword {
            "manufacturer" => {
                comp.manufacturer = tail.to_string();
                None
            }
            "package" => {
                comp.package.get_or_insert_with(Package::default);
                Some(TableType::Package)
            }
            "pin" => {
                self.pin_has_rlc = tail.to_ascii_lowercase().contains("r_pin");
                Some(TableType::Pin)
            }
            other => {
                tracing::debug!("Ignoring component keyword [{}]", other);
                Some(TableType::Ignored)
            }
        };
    }

    fn model_keyword(&mut self, keyword: &str, tail: &str) -> Result<(), ParseError> {
        let Some(model) = self.model.as_mut() else {
            return Ok(());
        };
        self.table = match keyword {
            "temperature range" => {
                model.temperature_range = parse_triple(tail, "[Temperature Range]")?;
                None
            }
            "voltage range" => {
                model.voltage_range = parse_triple(tail, "[Voltage Range]")?;
                None
            }
            "pullup reference" => {
                model.pullup_reference = parse_triple(tail, "[Pullup Reference]")?;
                None
            }
            "pulldown reference" => {
                model.pulldown_reference = parse_triple(tail, "[Pulldown Reference]")?;
                None
            }
            "power clamp reference" => {
                model.power_clamp_reference = parse_triple(tail, "[POWER Clamp Reference]")?;
                None
            }
            "gnd clamp reference" => {
                model.gnd_clamp_reference = parse_triple(tail, "[GND Clamp Reference]")?;
                None
            }
            "pullup" => {
                model.pullup = Some(IVTable::default());
                Some(TableType::Pullup)
            }
            "pulldown" => {
                model.pulldown = Some(IVTable::default());
                Some(TableType::Pulldown)
            }
            "power clamp" => {
                model.power_clamp = Some(IVTable::default());
                Some(TableType::PowerClamp)
            }
            "gnd clamp" => {
                model.gnd_clamp = Some(IVTable::default());
                Some(TableType::GndClamp)
            }
            "rising waveform" => {
                model.rising_waveform.push(WaveformTable::default());
                Some(TableType::RisingWaveform)
            }
            "falling waveform" => {
                model.falling_waveform.push(WaveformTable::default());
                Some(TableType::FallingWaveform)
            }
            other => {
                tracing::debug!("Ignoring model keyword [{}] in model {}", other, model.name);
                Some(TableType::Ignored)
            }
        };
        Ok(())
    }

    fn component_row(&mut self, line: &str) -> Result<(), ParseError> {
        let Some(comp) = self.component.as_mut() else {
            return Ok(());
        };
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(());
        }
        match self.table {
            Some(TableType::Package) => {
                let package = comp.package.get_or_insert_with(Package::default);
                let key = tokens[0].to_ascii_lowercase();
                let triple = parse_triple_tokens(&tokens[1..], &tokens[0])?;
                match key.as_str() {
                    "r_pkg" => package.r_pkg = triple,
                    "l_pkg" => package.l_pkg = triple,
                    "c_pkg" => package.c_pkg = triple,
                    _ => tracing::debug!("Ignoring package parameter {}", tokens[0]),
                }
            }
            Some(TableType::Pin) => {
                if tokens.len() < 3 {
                    return Err(ParseError::invalid_value(
                        "[Pin]",
                        format!("expected pin, signal_name and model_name, got '{}'", line),
                    ));
                }
                let mut pin = Pin {
                    name: tokens[0].to_string(),
                    signal_name: tokens[1].to_string(),
                    model_name: tokens[2].to_string(),
                    ..Default::default()
                };
                if self.pin_has_rlc && tokens.len() >= 6 {
                    pin.r_pin = parse_value(tokens[3], "R_pin")?;
                    pin.l_pin = parse_value(tokens[4], "L_pin")?;
                    pin.c_pin = parse_value(tokens[5], "C_pin")?;
                }
                comp.pins.push(pin);
            }
            _ => {}
        }
        Ok(())
    }

    fn model_row(&mut self, line: &str) -> Result<(), ParseError> {
        let Some(model) = self.model.as_mut() else {
            return Ok(());
        };
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(());
        }
        match self.table {
            None => {
                let key = tokens[0].to_ascii_lowercase();
                let arg = tokens.get(1).copied();
                match key.as_str() {
                    "model_type" => {
                        let name = arg.ok_or_else(|| ParseError::missing_keyword("Model_type value"))?;
                        model.model_type = ModelType::from_ibis(name).unwrap_or_else(|| {
                            tracing::warn!("Model {} has unsupported Model_type '{}'", model.name, name);
                            ModelType::Other
                        });
                        self.model_type_seen = true;
                    }
                    "c_comp" => model.c_comp = parse_triple_tokens(&tokens[1..], "C_comp")?,
                    "vinl" => model.vinl = arg.map(|v| parse_value(v, "Vinl")).transpose()?.flatten(),
                    "vinh" => model.vinh = arg.map(|v| parse_value(v, "Vinh")).transpose()?.flatten(),
                    _ => tracing::trace!("Ignoring model sub-parameter {}", tokens[0]),
                }
            }
            Some(kind @ (TableType::Pullup | TableType::Pulldown | TableType::PowerClamp | TableType::GndClamp)) => {
                let row = parse_row(&tokens)?;
                let table = match kind {
                    TableType::Pullup => model.pullup.as_mut(),
                    TableType::Pulldown => model.pulldown.as_mut(),
                    TableType::PowerClamp => model.power_clamp.as_mut(),
                    _ => model.gnd_clamp.as_mut(),
                };
                if let Some(table) = table {
                    table.points.push(row);
                }
            }
            Some(kind @ (TableType::RisingWaveform | TableType::FallingWaveform)) => {
                let waveform = match kind {
                    TableType::RisingWaveform => model.rising_waveform.last_mut(),
                    _ => model.falling_waveform.last_mut(),
                };
                let Some(waveform) = waveform else {
                    return Ok(());
                };
                let key = tokens[0].to_ascii_lowercase();
                let fixture_value = || -> Result<Option<f64>, ParseError> {
                    let value = tokens
                        .get(1)
                        .ok_or_else(|| ParseError::missing_keyword(format!("{} value", tokens[0])))?;
                    parse_value(value, tokens[0])
                };
                match key.as_str() {
                    "r_fixture" => waveform.r_fixture = fixture_value()?,
                    "v_fixture" => waveform.v_fixture = fixture_value()?,
                    "v_fixture_min" => waveform.v_fixture_min = fixture_value()?,
                    "v_fixture_max" => waveform.v_fixture_max = fixture_value()?,
                    "c_fixture" => waveform.c_fixture = fixture_value()?,
                    "l_fixture" => waveform.l_fixture = fixture_value()?,
                    "r_dut" | "l_dut" | "c_dut" => {
                        tracing::debug!("Ignoring {} in model {}", tokens[0], model.name)
                    }
                    _ => waveform.points.push(parse_row(&tokens)?),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn append_header(&mut self, field: HeaderField, text: &str) {
        let header = &mut self.file.header;
        let target = match field {
            HeaderField::IbisVer => &mut header.ibis_ver,
            HeaderField::FileName => &mut header.file_name,
            HeaderField::FileRev => &mut header.file_rev,
            HeaderField::Date => &mut header.date,
            HeaderField::Source => &mut header.source,
            HeaderField::Notes => &mut header.notes,
            HeaderField::Disclaimer => &mut header.disclaimer,
            HeaderField::Copyright => &mut header.copyright,
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(text);
    }

    /// Save any pending component or model.
    fn flush(&mut self) -> Result<(), ParseError> {
        if let Some(comp) = self.component.take() {
            self.file.components.push(comp);
        }
        if let Some(model) = self.model.take() {
            if !self.model_type_seen {
                return Err(ParseError::missing_keyword(format!(
                    "Model_type in [Model] {}",
                    model.name
                )));
            }
            self.file.models.push(model);
        }
        self.table = None;
        self.section = Section::None;
        Ok(())
    }

    fn finish(mut self) -> Result<IbisFile, ParseError> {
        self.flush()?;
        Ok(self.file)
    }
}

/// `[Comment Char] #_char` changes the comment character for the rest of the file.
fn comment_char_override(line: &str) -> Option<Result<char, ParseError>> {
    let rest = line.strip_prefix('[')?;
    let (keyword, tail) = rest.split_once(']')?;
    if normalize_keyword(keyword) != "comment char" {
        return None;
    }
    let tail = tail.trim();
    let result = match (tail.chars().next(), tail.get(1..)) {
        (Some(c), Some(suffix)) if suffix.eq_ignore_ascii_case("_char") => Ok(c),
        _ => Err(ParseError::invalid_value(
            "[Comment Char]",
            format!("expected '<char>_char', got '{}'", tail),
        )),
    };
    Some(result)
}

/// Lowercase a keyword and treat `_` and runs of spaces alike.
fn normalize_keyword(keyword: &str) -> String {
    keyword
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Split a data line into tokens, treating `=` as whitespace.
fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || c == '=')
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_row(tokens: &[&str]) -> Result<TableRow, ParseError> {
    if tokens.len() < 4 {
        return Err(ParseError::invalid_value(
            "table row",
            format!("expected 4 columns, got {}", tokens.len()),
        ));
    }
    let x = parse_required(tokens[0], "table row")?;
    let typ = parse_required(tokens[1], "typ column")?;
    let min = parse_value(tokens[2], "min column")?;
    let max = parse_value(tokens[3], "max column")?;
    Ok(TableRow {
        x,
        values: Triple::new(typ, min, max),
    })
}

fn parse_triple(text: &str, field: &str) -> Result<Option<Triple<f64>>, ParseError> {
    parse_triple_tokens(&tokenize(text), field)
}

/// A `typ [min [max]]` triple. Missing or `NA` min/max become `None`.
fn parse_triple_tokens(tokens: &[&str], field: &str) -> Result<Option<Triple<f64>>, ParseError> {
    let Some(first) = tokens.first() else {
        return Ok(None);
    };
    let typ = parse_required(first, field)?;
    let min = tokens.get(1).map(|t| parse_value(t, field)).transpose()?.flatten();
    let max = tokens.get(2).map(|t| parse_value(t, field)).transpose()?.flatten();
    Ok(Some(Triple::new(typ, min, max)))
}

fn parse_required(token: &str, field: &str) -> Result<f64, ParseError> {
    parse_value(token, field)?
        .ok_or_else(|| ParseError::invalid_value(field, "typical value cannot be NA"))
}

/// Parse a numeric token, returning `None` for `NA`.
pub fn parse_value(token: &str, field: &str) -> Result<Option<f64>, ParseError> {
    let token = token.trim();
    if token.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    match all_consuming(scaled_number).parse(token) {
        Ok((_, v)) if v.is_finite() => Ok(Some(v)),
        _ => Err(ParseError::invalid_value(
            field,
            format!("'{}' is not a number", token),
        )),
    }
}

/// A number with an optional IBIS scale factor and trailing unit letters,
/// e.g. `3.3`, `250.0m`, `2.5pF`, `1.0e-9`, `10mA`.
fn scaled_number(input: &str) -> IResult<&str, f64> {
    let (input, mantissa) = double(input)?;
    let (input, scale) = opt(scale_factor).parse(input)?;
    let (input, _unit) = alpha0(input)?;
    Ok((input, mantissa * scale.unwrap_or(1.0)))
}

/// IBIS scale factors are case sensitive: `M` is mega and `m` is milli.
fn scale_factor(input: &str) -> IResult<&str, f64> {
    alt((
        value(1e6, tag_no_case("meg")),
        value(1e12, char('T')),
        value(1e9, char('G')),
        value(1e6, char('M')),
        value(1e3, alt((char('k'), char('K')))),
        value(1e-3, char('m')),
        value(1e-6, char('u')),
        value(1e-9, char('n')),
        value(1e-12, char('p')),
        value(1e-15, char('f')),
    ))
    .parse(input)
}
