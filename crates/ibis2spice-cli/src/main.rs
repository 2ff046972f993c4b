//! ibis2spice CLI: convert IBIS buffer models into behavioural SPICE subcircuits.
//!
//! This is the main entry point for the ibis2spice tool.

mod config;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lib_convert::{
    extract, write_subcircuit_file, ConvertError, Dialect, GenerateOptions, Generator, IoType,
    JobFailure, KParamsByEdge, Solver, Stimulus, DEFAULT_THRESHOLD,
};
use lib_ibis::{IbisFile, ParseError};
use lib_types::{Corner, Edge, Seconds};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ibis2spice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Which model to take from which file.
#[derive(Args, Debug)]
struct ModelArgs {
    /// Path to the .ibs file
    #[arg(long)]
    ibis: PathBuf,

    /// Component name
    #[arg(long)]
    component: String,

    /// Model name
    #[arg(long)]
    model: String,

    /// Process corner (typ, min, max)
    #[arg(long, default_value = "typ")]
    corner: Corner,
}

#[derive(Subcommand)]
enum Commands {
    /// List the components, pins and models of an IBIS file
    Inspect {
        /// Path to the .ibs file
        file: PathBuf,
    },

    /// Generate a behavioural subcircuit for one model
    Convert {
        #[command(flatten)]
        target: ModelArgs,

        /// Target simulator (ltspice, ngspice)
        #[arg(long, default_value = "ltspice")]
        dialect: Dialect,

        /// Subcircuit kind (output, input, io)
        #[arg(long, default_value = "output")]
        io_type: IoType,

        /// K-parameter compression threshold
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// Delay before the rising edge (ns)
        #[arg(long, default_value = "0")]
        delay: f64,

        /// Time from the start of the rising edge to the start of the falling edge (ns)
        #[arg(long)]
        high_time: Option<f64>,

        /// Repeat period of the stimulus (ns)
        #[arg(long)]
        period: Option<f64>,

        /// Output subcircuit path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Solve and dump the K-parameter series of one edge
    Kparams {
        #[command(flatten)]
        target: ModelArgs,

        /// Edge (rising, falling)
        #[arg(long)]
        edge: Edge,

        /// Compress the series with this threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a batch of conversions from a configuration file
    Batch {
        /// Path to the batch configuration file (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for subcircuits and the summary
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Cancel the remaining jobs after the first failure
        #[arg(long)]
        fail_fast: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Inspect { file } => {
            inspect(&file, cli.format)?;
        }
        Commands::Convert {
            target,
            dialect,
            io_type,
            threshold,
            delay,
            high_time,
            period,
            output,
        } => {
            let stimulus = Stimulus {
                delay: Seconds::from_ns(delay),
                high_time: high_time.map(Seconds::from_ns),
                period: period.map(Seconds::from_ns),
            };
            let options = GenerateOptions {
                threshold,
                stimulus,
                ..Default::default()
            };
            let generator = Generator::new(io_type, dialect, target.corner).with_options(options);
            convert(&target, &generator, &output)?;
        }
        Commands::Kparams {
            target,
            edge,
            threshold,
            output,
        } => {
            kparams(&target, edge, threshold, output.as_deref(), cli.format)?;
        }
        Commands::Batch {
            config,
            output,
            fail_fast,
        } => {
            return run_batch(&config, &output, fail_fast, cli.format);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_ibis(file: &Path) -> Result<IbisFile> {
    tracing::info!("Parsing IBIS file: {:?}", file);
    lib_ibis::load_ibs_file(file).with_context(|| format!("Failed to load IBIS file {:?}", file))
}

fn inspect(file: &Path, format: OutputFormat) -> Result<()> {
    let ibis = load_ibis(file)?;
    output::print_inspect(&ibis, format)
}

fn convert(target: &ModelArgs, generator: &Generator, output: &Path) -> Result<()> {
    let ibis = load_ibis(&target.ibis)?;
    let model = extract(&ibis, &target.component, &target.model)?;

    write_subcircuit_file(output, generator, &model, &KParamsByEdge::default())
        .with_context(|| format!("Failed to convert {}/{}", target.component, target.model))?;

    println!(
        "Wrote {} subcircuit for {}/{} ({}) to {:?}",
        generator.dialect, target.component, target.model, target.corner, output
    );
    Ok(())
}

fn kparams(
    target: &ModelArgs,
    edge: Edge,
    threshold: Option<f64>,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let ibis = load_ibis(&target.ibis)?;
    let model = extract(&ibis, &target.component, &target.model)?;

    let solution = Solver::default().solve_detailed(&model, target.corner, edge)?;
    for anomaly in &solution.anomalies {
        tracing::warn!(
            "Clamped K-parameters at t={:.4} ns (raw Ku={:.4}, Kd={:.4})",
            Seconds(anomaly.time).as_ns(),
            anomaly.raw_ku,
            anomaly.raw_kd
        );
    }

    let compressed = threshold
        .map(|t| lib_convert::compress(&solution.series, t))
        .transpose()?;

    let report = output::KParamReport {
        model: &model,
        corner: target.corner,
        edge,
        solution: &solution,
        compressed: compressed.as_ref(),
    };
    match output {
        Some(path) => {
            let mut f = std::fs::File::create(path)
                .map_err(ConvertError::SinkWrite)
                .with_context(|| format!("Failed to create {:?}", path))?;
            output::write_kparams(&report, format, &mut f)?;
            tracing::info!("Wrote K-parameters to {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            output::write_kparams(&report, format, &mut stdout.lock())?;
        }
    }
    Ok(())
}

fn run_batch(config_path: &Path, output_dir: &Path, fail_fast: bool, format: OutputFormat) -> Result<ExitCode> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    std::fs::create_dir_all(output_dir)
        .map_err(ConvertError::SinkWrite)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let orchestrator = orchestrator::Orchestrator::new(config, output_dir, fail_fast);
    let summary = orchestrator.run();

    output::write_summary(&summary, output_dir, format)?;
    output::print_summary(&summary);

    tracing::info!("Batch complete. Results written to {:?}", output_dir);
    Ok(match summary.first_error() {
        Some(code) => ExitCode::from(code),
        None => ExitCode::SUCCESS,
    })
}

/// Process exit code for a conversion error.
pub(crate) fn convert_exit_code(err: &ConvertError) -> u8 {
    match err {
        ConvertError::NotFound { .. } => 2,
        ConvertError::UnsupportedIoType { .. } | ConvertError::UnsupportedDialect(_) => 3,
        ConvertError::SinkWrite(_) => 4,
        _ => 1,
    }
}

/// Process exit code for the first recognised error in the chain.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ConvertError>() {
            return convert_exit_code(e);
        }
        if let Some(f) = cause.downcast_ref::<JobFailure>() {
            return convert_exit_code(&f.error);
        }
        if let Some(ParseError::Io(e)) = cause.downcast_ref::<ParseError>() {
            if e.kind() == std::io::ErrorKind::NotFound {
                return 2;
            }
        }
    }
    1
}
