//! Result output formatting and writing.

use crate::orchestrator::BatchSummary;
use crate::OutputFormat;
use anyhow::Result;
use lib_convert::{DataModel, JobStatus, Solution};
use lib_ibis::{IbisFile, Package};
use lib_types::{Corner, Edge, Farads, Henries, KParamSeries, Ohms, SiValue};
use std::io::Write;
use std::path::Path;

/// Print the contents of an IBIS file to stdout.
pub fn print_inspect(ibis: &IbisFile, format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    write_inspect(ibis, format, &mut stdout.lock())
}

fn write_inspect<W: Write + ?Sized>(ibis: &IbisFile, format: OutputFormat, out: &mut W) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(out, "IBIS File: {}", ibis.header.file_name)?;
            writeln!(out, "Version: {}", ibis.header.ibis_ver)?;
            writeln!(out, "Source: {}", ibis.header.source)?;
            writeln!(out, "Components: {}", ibis.components.len())?;
            writeln!(out, "Models: {}", ibis.models.len())?;

            for component in &ibis.components {
                writeln!(out, "\n  Component: {}", component.name)?;
                if let Some(package) = &component.package {
                    let (r, l, c) = typical_package(package);
                    writeln!(
                        out,
                        "    Package: R={:.3} ohm, L={:.3} nH, C={:.3} pF",
                        r.0,
                        l.as_nh(),
                        c.as_pf()
                    )?;
                }
                writeln!(out, "    Pins: {}", component.pins.len())?;
                for pin in &component.pins {
                    writeln!(out, "      {:<6} {:<12} {}", pin.name, pin.signal_name, pin.model_name)?;
                }
            }

            for model in &ibis.models {
                writeln!(out, "\n  Model: {}", model.name)?;
                writeln!(out, "    Type: {}", model.model_type.ibis_name())?;
                if let Some(c) = model.c_comp {
                    writeln!(out, "    C_comp: {:.3} pF", Farads(c.typ).as_pf())?;
                }
                let tables = [
                    ("Pullup", model.pullup.is_some()),
                    ("Pulldown", model.pulldown.is_some()),
                    ("POWER Clamp", model.power_clamp.is_some()),
                    ("GND Clamp", model.gnd_clamp.is_some()),
                ];
                let present: Vec<&str> = tables.iter().filter(|(_, p)| *p).map(|(n, _)| *n).collect();
                if !present.is_empty() {
                    writeln!(out, "    Tables: {}", present.join(", "))?;
                }
                writeln!(
                    out,
                    "    Waveforms: {} rising, {} falling",
                    model.rising_waveform.len(),
                    model.falling_waveform.len()
                )?;
            }
        }
        OutputFormat::Json => {
            let components: Vec<_> = ibis
                .components
                .iter()
                .map(|c| {
                    let pins: Vec<_> = c
                        .pins
                        .iter()
                        .map(|p| {
                            serde_json::json!({
                                "name": p.name,
                                "signal": p.signal_name,
                                "model": p.model_name,
                            })
                        })
                        .collect();
                    serde_json::json!({
                        "name": c.name,
                        "manufacturer": c.manufacturer,
                        "package": c.package.as_ref().map(|p| {
                            let (r, l, c) = typical_package(p);
                            serde_json::json!({ "r_pkg": r.si(), "l_pkg": l.si(), "c_pkg": c.si() })
                        }),
                        "pins": pins,
                    })
                })
                .collect();
            let models: Vec<_> = ibis
                .models
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "name": m.name,
                        "model_type": m.model_type,
                        "c_comp": m.c_comp.map(|c| c.typ),
                        "convertible": m.model_type.is_convertible(),
                        "rising_waveforms": m.rising_waveform.len(),
                        "falling_waveforms": m.falling_waveform.len(),
                    })
                })
                .collect();
            let json = serde_json::json!({
                "file_name": ibis.header.file_name,
                "ibis_ver": ibis.header.ibis_ver,
                "components": components,
                "models": models,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            writeln!(out, "model,type,c_comp,pullup,pulldown,power_clamp,gnd_clamp,rising,falling")?;
            for m in &ibis.models {
                writeln!(
                    out,
                    "{},{},{},{},{},{},{},{},{}",
                    m.name,
                    m.model_type.ibis_name(),
                    cell(m.c_comp.map(|c| Farads(c.typ))),
                    m.pullup.is_some(),
                    m.pulldown.is_some(),
                    m.power_clamp.is_some(),
                    m.gnd_clamp.is_some(),
                    m.rising_waveform.len(),
                    m.falling_waveform.len()
                )?;
            }
        }
    }
    Ok(())
}

fn typical_package(package: &Package) -> (Ohms, Henries, Farads) {
    let typ = |t: Option<lib_types::Triple<f64>>| t.map_or(0.0, |t| t.typ);
    (
        Ohms(typ(package.r_pkg)),
        Henries(typ(package.l_pkg)),
        Farads(typ(package.c_pkg)),
    )
}

fn cell<T: SiValue>(value: Option<T>) -> String {
    value.map_or(String::new(), |v| format!("{:e}", v.si()))
}

/// Everything written by the `kparams` command.
pub struct KParamReport<'a> {
    pub model: &'a DataModel,
    pub corner: Corner,
    pub edge: Edge,
    pub solution: &'a Solution,
    pub compressed: Option<&'a KParamSeries>,
}

impl KParamReport<'_> {
    fn series(&self) -> &KParamSeries {
        self.compressed.unwrap_or(&self.solution.series)
    }
}

/// Write a solved K-parameter series.
pub fn write_kparams<W: Write + ?Sized>(report: &KParamReport<'_>, format: OutputFormat, out: &mut W) -> Result<()> {
    let series = report.series();
    match format {
        OutputFormat::Text => {
            writeln!(out, "Model:     {}/{}", report.model.component, report.model.model)?;
            writeln!(out, "Corner:    {}", report.corner)?;
            writeln!(out, "Edge:      {}", report.edge)?;
            writeln!(out, "Policy:    {}", report.solution.policy)?;
            writeln!(
                out,
                "Samples:   {} of {}",
                series.len(),
                report.solution.series.len()
            )?;
            writeln!(out, "Anomalies: {}", report.solution.anomalies.len())?;
            writeln!(out)?;
            writeln!(out, "{:>12} {:>10} {:>10}", "t (ns)", "Ku", "Kd")?;
            for s in series {
                writeln!(out, "{:>12.4} {:>10.6} {:>10.6}", s.t * 1e9, s.ku, s.kd)?;
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "component": report.model.component,
                "model": report.model.model,
                "corner": report.corner,
                "edge": report.edge,
                "policy": report.solution.policy,
                "original_samples": report.solution.series.len(),
                "samples": series.samples(),
                "anomalies": report.solution.anomalies,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            writeln!(out, "time_s,ku,kd")?;
            for s in series {
                writeln!(out, "{:e},{},{}", s.t, s.ku, s.kd)?;
            }
        }
    }
    Ok(())
}

/// Write the batch summary to the output directory.
pub fn write_summary(summary: &BatchSummary, output_dir: &Path, format: OutputFormat) -> Result<()> {
    let (name, content) = match format {
        OutputFormat::Text => ("summary.txt", summary_text(summary)?),
        OutputFormat::Json => ("summary.json", summary_json(summary)?),
        OutputFormat::Csv => ("summary.csv", summary_csv(summary)?),
    };
    let path = output_dir.join(name);
    std::fs::write(&path, content)?;
    tracing::info!("Wrote summary to {:?}", path);
    Ok(())
}

fn summary_text(summary: &BatchSummary) -> Result<Vec<u8>> {
    let mut f = Vec::new();
    writeln!(f, "ibis2spice Batch Summary: {}", summary.name)?;
    writeln!(f, "==========================")?;
    writeln!(f)?;
    for outcome in &summary.outcomes {
        match &outcome.status {
            JobStatus::Succeeded(report) => {
                write!(f, "OK        {} -> {}", outcome.key, report.output.display())?;
                if let (Some(r), Some(fl)) = (&report.rising, &report.falling) {
                    write!(
                        f,
                        " (rising {}/{}, falling {}/{})",
                        r.retained, r.original, fl.retained, fl.original
                    )?;
                }
                if report.anomalies > 0 {
                    write!(f, " [{} anomalies]", report.anomalies)?;
                }
                writeln!(f)?;
            }
            JobStatus::Failed(failure) => writeln!(f, "FAILED    {}", failure)?,
            JobStatus::Cancelled => writeln!(f, "CANCELLED {}", outcome.key)?,
        }
    }
    for failure in &summary.load_failures {
        writeln!(f, "FAILED    {}: {}", failure.key, failure.message)?;
    }
    writeln!(f)?;
    writeln!(
        f,
        "Jobs: {} total, {} succeeded, {} failed, {} cancelled",
        summary.total(),
        summary.succeeded(),
        summary.failed(),
        summary.cancelled()
    )?;
    Ok(f)
}

fn summary_json(summary: &BatchSummary) -> Result<Vec<u8>> {
    let mut jobs: Vec<_> = summary
        .outcomes
        .iter()
        .map(|o| match &o.status {
            JobStatus::Succeeded(report) => serde_json::json!({
                "key": o.key,
                "status": "succeeded",
                "report": report,
            }),
            JobStatus::Failed(failure) => serde_json::json!({
                "key": o.key,
                "status": "failed",
                "error": failure.error.to_string(),
            }),
            JobStatus::Cancelled => serde_json::json!({
                "key": o.key,
                "status": "cancelled",
            }),
        })
        .collect();
    jobs.extend(summary.load_failures.iter().map(|f| {
        serde_json::json!({
            "key": f.key,
            "status": "failed",
            "error": f.message,
        })
    }));
    let json = serde_json::json!({
        "name": summary.name,
        "total": summary.total(),
        "succeeded": summary.succeeded(),
        "failed": summary.failed(),
        "cancelled": summary.cancelled(),
        "jobs": jobs,
    });
    Ok(serde_json::to_vec_pretty(&json)?)
}

fn summary_csv(summary: &BatchSummary) -> Result<Vec<u8>> {
    let mut f = Vec::new();
    writeln!(f, "component,model,corner,status,output,detail")?;
    for o in &summary.outcomes {
        let (status, output, detail) = match &o.status {
            JobStatus::Succeeded(r) => ("succeeded", r.output.display().to_string(), String::new()),
            JobStatus::Failed(e) => ("failed", String::new(), e.error.to_string()),
            JobStatus::Cancelled => ("cancelled", String::new(), String::new()),
        };
        writeln!(
            f,
            "{},{},{},{},{},\"{}\"",
            o.key.component,
            o.key.model,
            o.key.corner.label(),
            status,
            output,
            detail.replace('"', "\"\"")
        )?;
    }
    for l in &summary.load_failures {
        writeln!(
            f,
            "{},{},{},failed,,\"{}\"",
            l.key.component,
            l.key.model,
            l.key.corner.label(),
            l.message.replace('"', "\"\"")
        )?;
    }
    Ok(f)
}

/// Print the batch totals to stdout.
pub fn print_summary(summary: &BatchSummary) {
    println!("\n=== Batch: {} ===\n", summary.name);
    println!("  Succeeded: {}", summary.succeeded());
    println!("  Failed:    {}", summary.failed());
    println!("  Cancelled: {}", summary.cancelled());

    for outcome in &summary.outcomes {
        if let JobStatus::Failed(failure) = &outcome.status {
            println!("  {}", failure);
        }
    }
    for failure in &summary.load_failures {
        println!("  {}: {}", failure.key, failure.message);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_convert::{extract, Solver};

    fn buffer_ibs() -> IbisFile {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../lib-convert/tests/data/buffer.ibs");
        lib_ibis::load_ibs_file(path).unwrap()
    }

    #[test]
    fn test_inspect_formats() {
        let ibis = buffer_ibs();

        let mut text = Vec::new();
        write_inspect(&ibis, OutputFormat::Text, &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("Component: DRV1G"));
        assert!(text.contains("Package: R=0.250 ohm, L=2.000 nH, C=0.500 pF"));
        assert!(text.contains("Model: OUT_50"));

        let mut json = Vec::new();
        write_inspect(&ibis, OutputFormat::Json, &mut json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["components"][0]["pins"].as_array().unwrap().len(), 6);
        assert_eq!(value["models"][3]["convertible"], false);

        let mut csv = Vec::new();
        write_inspect(&ibis, OutputFormat::Csv, &mut csv).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert_eq!(csv.lines().count(), 1 + ibis.models.len());
        assert!(csv.contains("OUT_50,Output,2e-12,true,true,true,true,2,2"));
    }

    #[test]
    fn test_kparams_json() {
        let ibis = buffer_ibs();
        let model = extract(&ibis, "DRV1G", "OUT_WEAK").unwrap();
        let solution = Solver::default()
            .solve_detailed(&model, Corner::Typical, Edge::Falling)
            .unwrap();
        let report = KParamReport {
            model: &model,
            corner: Corner::Typical,
            edge: Edge::Falling,
            solution: &solution,
            compressed: None,
        };

        let mut out = Vec::new();
        write_kparams(&report, OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["edge"], "falling");
        assert_eq!(value["policy"], "complementary");
        let samples = value["samples"].as_array().unwrap();
        assert_eq!(samples.len(), solution.series.len());
        assert_eq!(samples[0]["ku"], 1.0);
    }
}
