//! Validated, immutable job set.
//!
//! Built once from configuration and swapped wholesale on admin reload. A job
//! whose curve fails validation is kept in the index as disabled — unjoinable
//! and excluded from active listings — with the error captured for
//! diagnostics, instead of crashing the store.

use crate::config::JobConfig;
use crate::core::{JobId, JobsError, Result};
use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;

pub struct JobEntry {
    pub config: JobConfig,
    /// Why the job is disabled, when it is.
    pub disabled: Option<String>,
}

impl JobEntry {
    pub fn is_enabled(&self) -> bool {
        self.disabled.is_none()
    }
}

pub struct JobIndex {
    jobs: HashMap<JobId, Arc<JobEntry>>,
}

impl JobIndex {
    pub fn build(configs: Vec<JobConfig>) -> Self {
        let mut jobs = HashMap::new();
        for config in configs {
            let disabled = match config.curve.validate(config.max_level) {
                Ok(()) => None,
                Err(e) => {
                    error!("job '{}' disabled: {}", config.id, e);
                    Some(e.to_string())
                }
            };
            let id = config.id.clone();
            jobs.insert(id, Arc::new(JobEntry { config, disabled }));
        }
        info!(
            "job index built: {} jobs, {} disabled",
            jobs.len(),
            jobs.values().filter(|j| !j.is_enabled()).count()
        );
        Self { jobs }
    }

    pub fn get(&self, job: &JobId) -> Option<&Arc<JobEntry>> {
        self.jobs.get(job)
    }

    /// Resolve a job that must exist and be enabled.
    pub fn require_enabled(&self, job: &JobId) -> Result<&Arc<JobEntry>> {
        let entry = self
            .jobs
            .get(job)
            .ok_or_else(|| JobsError::JobNotFound(job.to_string()))?;
        if let Some(reason) = &entry.disabled {
            return Err(JobsError::JobDisabled(job.to_string(), reason.clone()));
        }
        Ok(entry)
    }

    /// Enabled jobs only.
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|e| e.is_enabled())
            .map(|e| e.config.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Disabled jobs with their captured diagnostics.
    pub fn disabled_jobs(&self) -> Vec<(JobId, String)> {
        self.jobs
            .values()
            .filter_map(|e| e.disabled.as_ref().map(|r| (e.config.id.clone(), r.clone())))
            .collect()
    }

    pub fn all_configs(&self) -> Vec<JobConfig> {
        self.jobs.values().map(|e| e.config.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
