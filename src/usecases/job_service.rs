//! Job lifecycle against a ModelStore: status, progress, run completion.
//!
//! Each method loads what it needs, applies the entity transition and saves.

use crate::domain::messages::{CompleteRunRequest, UpdateJobProgressRequest};
use crate::domain::{Client, Device, DomainError, Job, JobStatus, MetricsReport, Run, RunResult};
use crate::ports::{Filter, ModelStore, ModelStoreExt};
use crate::utils::time::elapsed_seconds;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct JobService {
    store: Arc<dyn ModelStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self { store }
    }

    pub async fn get_job_by_id(&self, job_id: &str) -> Result<Option<Job>, DomainError> {
        info!(job_id, "searching for job");
        let job = self.store.get::<Job>(job_id).await?;
        match &job {
            Some(_) => info!(job_id, "job found"),
            None => error!(job_id, "job not found"),
        }
        Ok(job)
    }

    async fn require_job(&self, job_id: &str) -> Result<Job, DomainError> {
        self.get_job_by_id(job_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Job", job_id))
    }

    /// Change a job's status.
    ///
    /// Interrupting a job that had a host releases one active-job slot on that
    /// host's client (the given hostname, else the job's own), once the job
    /// itself is saved.
    pub async fn update_job_status(
        &self,
        job_id: &str,
        status: impl Into<JobStatus>,
        hostname: Option<&str>,
    ) -> Result<Job, DomainError> {
        let status = status.into();
        let mut job = self.require_job(job_id).await?;
        let previous_host = job.hostname.clone();
        job.update_status(status.clone(), hostname);
        self.store.save(&mut job).await?;
        info!(job_id, status = %status, "job status updated");

        if status == JobStatus::Interrupted {
            if let Some(host) = hostname.map(String::from).or(previous_host) {
                self.release_client_slot(&host).await?;
            }
        }
        Ok(job)
    }

    async fn release_client_slot(&self, hostname: &str) -> Result<(), DomainError> {
        let filter = Filter::new().where_eq("hostname", hostname);
        match self.store.find_one::<Client>(&filter).await? {
            Some(mut client) => {
                client.remove_active_job();
                self.store.save(&mut client).await
            }
            None => {
                warn!(hostname, "no client to release job from");
                Ok(())
            }
        }
    }

    /// Start the next run: the previous current run is retired and a new one stored.
    pub async fn update_progress(&self, update: &UpdateJobProgressRequest) -> Result<Run, DomainError> {
        let mut job = self.require_job(&update.job_id).await?;
        info!(
            job_id = %job.id,
            from = job.run_number,
            to = update.run_number,
            "job progress updated"
        );
        job.run_number = update.run_number;
        job.total_runs = update.total_runs;

        for mut current in self.current_runs(&job.id).await? {
            current.is_current = false;
            self.store.save(&mut current).await?;
            info!(job_id = %job.id, run = current.number, "run marked as not current");
        }

        let run = job.start_run(&update.run_config, update.run_number);
        self.store.insert(&run).await?;
        self.store.save(&mut job).await?;
        Ok(run)
    }

    /// Finish the job's current run and elect the job's best run.
    ///
    /// A run beats the standing best when its `TE-all` MAE (last axis) is lower.
    /// A new best is also offered to the device's best metrics. Returns `None`
    /// when the job has no current run.
    pub async fn complete_run(&self, update: &CompleteRunRequest) -> Result<Option<Run>, DomainError> {
        let mut job = self.require_job(&update.job_id).await?;
        info!(job_id = %job.id, run = update.run_number, "run completed");
        let Some(mut run) = self.current_runs(&job.id).await?.into_iter().next() else {
            error!(job_id = %job.id, "no current run found");
            return Ok(None);
        };

        run.complete(
            update.epochs_completed,
            update.train_metrics.clone(),
            update.val_metrics.clone(),
            update.test_metrics.clone(),
        );

        let best_filter = Filter::new()
            .where_eq("job_id", job.id.as_str())
            .where_eq("is_best", true);
        let mut best_run = self.store.find_one::<Run>(&best_filter).await?;
        if Self::elect(&job, &run, best_run.as_ref()) {
            run.is_best = true;
            if let Some(previous) = best_run.as_mut() {
                previous.is_best = false;
                self.store.save(previous).await?;
            }
            self.offer_to_device(&job, &run).await?;
        }
        self.store.save(&mut run).await?;

        let since = job.started_at.or(job.assigned_at).unwrap_or(job.created_at);
        if let Some(completed_at) = run.completed_at {
            job.duration = elapsed_seconds(&since, &completed_at);
        }
        self.store.save(&mut job).await?;
        Ok(Some(run))
    }

    fn elect(job: &Job, run: &Run, best: Option<&Run>) -> bool {
        let Some(score) = run.best_metric() else {
            warn!(job_id = %job.id, run = run.number, "run has no TE-all mae; not a best-run candidate");
            return false;
        };
        match best.and_then(|b| b.best_metric().map(|s| (b.number, s))) {
            None => {
                info!(job_id = %job.id, run = run.number, "first best run ({:.4})", score);
                true
            }
            Some((_, best_score)) if score < best_score => {
                info!(
                    job_id = %job.id,
                    run = run.number,
                    "new best run ({:.4} < {:.4})",
                    score,
                    best_score
                );
                true
            }
            Some((best_number, best_score)) => {
                info!(
                    job_id = %job.id,
                    run = run.number,
                    best = best_number,
                    "not the best run ({:.4} >= {:.4})",
                    score,
                    best_score
                );
                false
            }
        }
    }

    async fn offer_to_device(&self, job: &Job, run: &Run) -> Result<(), DomainError> {
        let Some(mut device) = self.store.get::<Device>(&job.device_axf_id).await? else {
            return Ok(());
        };
        let empty = MetricsReport::default();
        let result = RunResult {
            run_number: run.number,
            job_timestamp: job.timestamp,
            train_metrics: run.train_metrics.as_ref().unwrap_or(&empty),
            val_metrics: run.val_metrics.as_ref().unwrap_or(&empty),
            test_metrics: run.test_metrics.as_ref().unwrap_or(&empty),
        };
        if device.update_best_metrics(&job.model_type, result) {
            self.store.save(&mut device).await?;
        }
        Ok(())
    }

    async fn current_runs(&self, job_id: &str) -> Result<Vec<Run>, DomainError> {
        let filter = Filter::new()
            .where_eq("job_id", job_id)
            .where_eq("is_current", true);
        self.store.find_all::<Run>(&filter).await
    }

    /// Stamp completion and duration.
    pub async fn complete(&self, job_id: &str) -> Result<Job, DomainError> {
        let mut job = self.require_job(job_id).await?;
        job.complete();
        self.store.save(&mut job).await?;
        Ok(job)
    }

    pub async fn heartbeat(&self, job_id: &str) -> Result<Job, DomainError> {
        let mut job = self.require_job(job_id).await?;
        job.heartbeat();
        self.store.save(&mut job).await?;
        Ok(job)
    }

    /// Every run of a job, oldest first.
    pub async fn runs_for_job(&self, job_id: &str) -> Result<Vec<Run>, DomainError> {
        self.store
            .find_all::<Run>(&Filter::new().where_eq("job_id", job_id))
            .await
    }
}
