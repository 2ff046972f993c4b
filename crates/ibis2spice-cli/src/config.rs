//! Batch configuration loading and validation.

use anyhow::{Context, Result};
use lib_convert::{Dialect, GenerateOptions, IoType, Stimulus, DEFAULT_THRESHOLD};
use lib_types::{Corner, Seconds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level batch configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Batch name/description.
    #[serde(default = "default_name")]
    pub name: String,

    /// Settings shared by every job unless the job overrides them.
    #[serde(default)]
    pub defaults: JobDefaults,

    /// Conversions to run.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

fn default_name() -> String {
    "ibis2spice batch".to_string()
}

/// Batch-wide conversion settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobDefaults {
    #[serde(default)]
    pub corner: Corner,

    #[serde(default)]
    pub dialect: Dialect,

    #[serde(default = "default_io_type")]
    pub io_type: IoType,

    /// K-parameter compression threshold.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub stimulus: StimulusConfig,
}

fn default_io_type() -> IoType {
    IoType::Output
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            corner: Corner::default(),
            dialect: Dialect::default(),
            io_type: default_io_type(),
            threshold: default_threshold(),
            stimulus: StimulusConfig::default(),
        }
    }
}

/// Stimulus timing in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StimulusConfig {
    /// Delay before the rising edge.
    #[serde(default)]
    pub delay_ns: f64,

    /// Rising-edge start to falling-edge start.
    pub high_time_ns: Option<f64>,

    /// Repeat period.
    pub period_ns: Option<f64>,
}

impl StimulusConfig {
    pub fn to_stimulus(self) -> Stimulus {
        Stimulus {
            delay: Seconds::from_ns(self.delay_ns),
            high_time: self.high_time_ns.map(Seconds::from_ns),
            period: self.period_ns.map(Seconds::from_ns),
        }
    }
}

/// One conversion in the batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Path to the IBIS file, relative to the configuration file.
    pub ibis: PathBuf,

    /// Component name within the IBIS file.
    pub component: String,

    /// Model name within the IBIS file.
    pub model: String,

    // Per-job overrides
    pub corner: Option<Corner>,
    pub dialect: Option<Dialect>,
    pub io_type: Option<IoType>,
    pub threshold: Option<f64>,
    pub stimulus: Option<StimulusConfig>,

    /// Output path, relative to the output directory.
    pub output: Option<PathBuf>,
}

/// A job with every override applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedJob {
    pub corner: Corner,
    pub dialect: Dialect,
    pub io_type: IoType,
    pub options: GenerateOptions,
}

impl JobConfig {
    pub fn resolve(&self, defaults: &JobDefaults) -> ResolvedJob {
        let options = GenerateOptions {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            stimulus: self.stimulus.unwrap_or(defaults.stimulus).to_stimulus(),
            ..Default::default()
        };
        ResolvedJob {
            corner: self.corner.unwrap_or(defaults.corner),
            dialect: self.dialect.unwrap_or(defaults.dialect),
            io_type: self.io_type.unwrap_or(defaults.io_type),
            options,
        }
    }
}

/// Load configuration from a file.
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: BatchConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content).with_context(|| "Failed to parse config as JSON")?
    } else {
        // Assume TOML
        toml::from_str(&content).with_context(|| "Failed to parse config as TOML")?
    };

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    validate_config(&config)?;

    Ok(config)
}

impl BatchConfig {
    /// Make relative IBIS paths relative to `base`.
    fn resolve_paths(&mut self, base: &Path) {
        for job in &mut self.jobs {
            if job.ibis.is_relative() {
                job.ibis = base.join(&job.ibis);
            }
        }
    }
}

/// Validate configuration.
pub fn validate_config(config: &BatchConfig) -> Result<()> {
    if config.jobs.is_empty() {
        anyhow::bail!("Batch '{}' has no jobs", config.name);
    }

    validate_threshold(config.defaults.threshold, "defaults")?;
    validate_stimulus(&config.defaults.stimulus, "defaults")?;

    for (idx, job) in config.jobs.iter().enumerate() {
        let label = format!("job {} ({}/{})", idx + 1, job.component, job.model);
        if !job.ibis.exists() {
            anyhow::bail!("{} IBIS file not found: {:?}", label, job.ibis);
        }
        if let Some(threshold) = job.threshold {
            validate_threshold(threshold, &label)?;
        }
        if let Some(ref stimulus) = job.stimulus {
            validate_stimulus(stimulus, &label)?;
        }
    }

    Ok(())
}

fn validate_threshold(threshold: f64, label: &str) -> Result<()> {
    if !(threshold.is_finite() && threshold > 0.0) {
        anyhow::bail!("{}: threshold must be positive (got {})", label, threshold);
    }
    Ok(())
}

fn validate_stimulus(stimulus: &StimulusConfig, label: &str) -> Result<()> {
    let times = [
        ("delay_ns", Some(stimulus.delay_ns)),
        ("high_time_ns", stimulus.high_time_ns),
        ("period_ns", stimulus.period_ns),
    ];
    for (name, value) in times {
        if let Some(v) = value {
            if !(v.is_finite() && v >= 0.0) {
                anyhow::bail!("{}: {} must be a non-negative time (got {})", label, name, v);
            }
        }
    }
    Ok(())
}
