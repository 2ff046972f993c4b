//! Batch orchestration.

use crate::config::BatchConfig;
use lib_convert::{
    run_batch, sanitize_name, BatchOptions, ConversionJob, JobKey, JobOutcome, JobStatus,
};
use lib_ibis::IbisFile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Batch orchestrator.
pub struct Orchestrator {
    config: BatchConfig,
    output_dir: PathBuf,
    options: BatchOptions,
}

/// A job whose IBIS file could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    pub key: JobKey,
    pub ibis: PathBuf,
    pub message: String,
}

/// Batch results.
#[derive(Debug)]
pub struct BatchSummary {
    pub name: String,
    pub outcomes: Vec<JobOutcome>,
    pub load_failures: Vec<LoadFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len() + self.load_failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        let converted = self
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, JobStatus::Failed(_)))
            .count();
        converted + self.load_failures.len()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, JobStatus::Cancelled))
            .count()
    }

    /// Exit code of the first failure, in job order.
    pub fn first_error(&self) -> Option<u8> {
        if !self.load_failures.is_empty() {
            return Some(1);
        }
        self.outcomes.iter().find_map(|o| match &o.status {
            JobStatus::Failed(f) => Some(crate::convert_exit_code(&f.error)),
            _ => None,
        })
    }
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: BatchConfig, output_dir: &Path, fail_fast: bool) -> Self {
        Self {
            config,
            output_dir: output_dir.to_path_buf(),
            options: BatchOptions {
                fail_fast,
                ..Default::default()
            },
        }
    }

    /// Run the batch.
    pub fn run(&self) -> BatchSummary {
        tracing::info!("Starting batch: {}", self.config.name);

        let (jobs, load_failures) = self.build_jobs();
        if !load_failures.is_empty() && self.options.fail_fast {
            tracing::warn!("Cancelling batch after {} load failures", load_failures.len());
            self.options.cancel.cancel();
        }

        let outcomes = run_batch(&jobs, &self.options);
        BatchSummary {
            name: self.config.name.clone(),
            outcomes,
            load_failures,
        }
    }

    /// Parse each IBIS file once and expand the configured jobs.
    fn build_jobs(&self) -> (Vec<ConversionJob>, Vec<LoadFailure>) {
        let mut documents: BTreeMap<&Path, Result<Arc<IbisFile>, String>> = BTreeMap::new();
        let mut jobs = Vec::with_capacity(self.config.jobs.len());
        let mut failures = Vec::new();

        for job in &self.config.jobs {
            let resolved = job.resolve(&self.config.defaults);
            let key = JobKey {
                component: job.component.clone(),
                model: job.model.clone(),
                corner: resolved.corner,
            };

            let document = documents.entry(job.ibis.as_path()).or_insert_with(|| {
                tracing::info!("Parsing IBIS file: {:?}", job.ibis);
                lib_ibis::load_ibs_file(&job.ibis)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            });
            let ibis = match document {
                Ok(ibis) => Arc::clone(ibis),
                Err(message) => {
                    tracing::error!("{}: failed to load {:?}: {}", key, job.ibis, message);
                    failures.push(LoadFailure {
                        key,
                        ibis: job.ibis.clone(),
                        message: message.clone(),
                    });
                    continue;
                }
            };

            let output = match &job.output {
                Some(path) => self.output_dir.join(path),
                None => self.output_dir.join(default_output_name(&key)),
            };
            jobs.push(ConversionJob {
                key,
                ibis,
                io_type: resolved.io_type,
                dialect: resolved.dialect,
                options: resolved.options,
                output,
            });
        }

        tracing::debug!(
            "Loaded {} IBIS files for {} jobs",
            documents.len(),
            self.config.jobs.len()
        );
        (jobs, failures)
    }
}

/// `<model>_<corner>.sub`, e.g. `OUT_50_typ.sub`.
fn default_output_name(key: &JobKey) -> String {
    format!("{}_{}.sub", sanitize_name(&key.model), key.corner.label())
}
