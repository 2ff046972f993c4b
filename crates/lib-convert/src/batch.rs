//! Parallel batch conversion.
//!
//! Jobs are independent (component, model, corner) units fanned out over the
//! rayon pool. Outcomes come back in job order. Cancellation is cooperative:
//! the token is checked before each job starts, never in the middle of one.

use crate::compress::CompressionStats;
use crate::error::ConvertError;
use crate::model::extract;
use crate::subckt::{write_subcircuit_file, Dialect, GenerateOptions, Generator, IoType, KParamsByEdge};
use lib_ibis::IbisFile;
use lib_types::{Corner, Edge};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifies one conversion unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub component: String,
    pub model: String,
    pub corner: Corner,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.component, self.model, self.corner)
    }
}

/// One conversion: a parsed document, what to take from it, and where to
/// write the result. The corner is taken from `key`.
#[derive(Clone, Debug)]
pub struct ConversionJob {
    pub key: JobKey,
    pub ibis: Arc<IbisFile>,
    pub io_type: IoType,
    pub dialect: Dialect,
    pub options: GenerateOptions,
    pub output: PathBuf,
}

impl ConversionJob {
    /// Generator for this job at `key.corner`.
    pub fn generator(&self) -> Generator {
        Generator::new(self.io_type, self.dialect, self.key.corner).with_options(self.options)
    }
}

/// A failed job with the key it belongs to.
#[derive(Debug)]
pub struct JobFailure {
    pub key: JobKey,
    pub error: ConvertError,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

impl std::error::Error for JobFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of a successful job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobReport {
    pub output: PathBuf,
    pub rising: Option<CompressionStats>,
    pub falling: Option<CompressionStats>,
    pub anomalies: usize,
}

#[derive(Debug)]
pub enum JobStatus {
    Succeeded(JobReport),
    Failed(JobFailure),
    Cancelled,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub key: JobKey,
    pub status: JobStatus,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded(_))
    }
}

/// Shared cooperative cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Batch run settings.
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    pub cancel: CancelToken,
    /// Cancel the remaining jobs after the first failure.
    pub fail_fast: bool,
}

/// Run all jobs in parallel, returning one outcome per job in job order.
pub fn run_batch(jobs: &[ConversionJob], options: &BatchOptions) -> Vec<JobOutcome> {
    tracing::info!("Running {} conversion jobs", jobs.len());

    let outcomes: Vec<JobOutcome> = jobs
        .par_iter()
        .map(|job| {
            if options.cancel.is_cancelled() {
                tracing::debug!("Skipping {} after cancellation", job.key);
                return JobOutcome {
                    key: job.key.clone(),
                    status: JobStatus::Cancelled,
                };
            }
            let status = match convert_job(job) {
                Ok(report) => {
                    tracing::info!("Converted {} -> {}", job.key, report.output.display());
                    JobStatus::Succeeded(report)
                }
                Err(error) => {
                    let failure = JobFailure {
                        key: job.key.clone(),
                        error,
                    };
                    tracing::error!("{}", failure);
                    if options.fail_fast {
                        options.cancel.cancel();
                    }
                    JobStatus::Failed(failure)
                }
            };
            JobOutcome {
                key: job.key.clone(),
                status,
            }
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    tracing::info!("Batch finished: {}/{} succeeded", succeeded, outcomes.len());
    outcomes
}

/// Extract, solve, compress and write one job.
pub fn convert_job(job: &ConversionJob) -> Result<JobReport, ConvertError> {
    let model = extract(&job.ibis, &job.key.component, &job.key.model)?;
    let generator = job.generator();

    let mut kparams = KParamsByEdge::default();
    let mut stats: [Option<CompressionStats>; 2] = [None, None];
    let mut anomalies = 0;
    if generator.io_type.drives() {
        for (slot, edge) in Edge::ALL.into_iter().enumerate() {
            let solved = generator.solve_edge(&model, edge)?;
            anomalies += solved.anomalies;
            stats[slot] = Some(solved.stats);
            match edge {
                Edge::Rising => kparams.rising = Some(solved.series),
                Edge::Falling => kparams.falling = Some(solved.series),
            }
        }
    }

    write_subcircuit_file(&job.output, &generator, &model, &kparams)?;
    let [rising, falling] = stats;
    Ok(JobReport {
        output: job.output.clone(),
        rising,
        falling,
        anomalies,
    })
}
