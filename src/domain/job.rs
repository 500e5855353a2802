//! Job: one training request for a device, executed as a sequence of runs.

use crate::domain::errors::DomainError;
use crate::domain::record::{new_id, Entity};
use crate::domain::run::{Run, RunConfig};
use crate::domain::schema::Column;
use crate::utils::time::{current_time, elapsed_seconds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::info;

/// Key in the job config naming the model output, e.g. `"force [N]"`.
pub const OUTPUT_TYPE_KEY: &str = "OUTPUT_TYPE";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelType {
    Force,
    Moment,
    Other(String),
}

impl ModelType {
    pub fn as_str(&self) -> &str {
        match self {
            ModelType::Force => "force",
            ModelType::Moment => "moment",
            ModelType::Other(s) => s,
        }
    }
}

impl From<String> for ModelType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "force" => ModelType::Force,
            "moment" => ModelType::Moment,
            _ => ModelType::Other(s),
        }
    }
}

impl From<&str> for ModelType {
    fn from(s: &str) -> Self {
        ModelType::from(s.to_string())
    }
}

impl From<ModelType> for String {
    fn from(m: ModelType) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored in `jobs.status`. Unknown strings survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    #[default]
    Queued,
    Assigned,
    Running,
    Completed,
    Interrupted,
    ShuttingDown,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Assigned => "assigned",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Interrupted => "interrupted",
            JobStatus::ShuttingDown => "shutting_down",
            JobStatus::Other(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => JobStatus::Queued,
            "assigned" => JobStatus::Assigned,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "interrupted" => JobStatus::Interrupted,
            "shutting_down" => JobStatus::ShuttingDown,
            _ => JobStatus::Other(s),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        JobStatus::from(s.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(s: JobStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    pub device_axf_id: String,
    pub model_type: ModelType,
    /// Raw JSON job configuration as submitted.
    pub config: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub timestamp: i64,
    pub run_number: i64,
    pub total_runs: i64,
    pub run_started_at: Option<DateTime<Utc>>,

    pub queued_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub interrupted_at: Option<DateTime<Utc>>,

    pub duration: f64,
    pub hostname: Option<String>,
}

impl Default for Job {
    fn default() -> Self {
        let now = current_time();
        Self {
            id: new_id(),
            device_axf_id: String::new(),
            model_type: ModelType::Other(String::new()),
            config: String::new(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            timestamp: 0,
            run_number: 0,
            total_runs: 0,
            run_started_at: None,
            queued_at: now,
            assigned_at: None,
            started_at: None,
            stopped_at: None,
            completed_at: None,
            last_heartbeat: None,
            interrupted_at: None,
            duration: 0.0,
            hostname: None,
        }
    }
}

/// Compact job view for list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleJob {
    pub id: String,
    pub device_id: String,
    pub model_type: ModelType,
    pub status: JobStatus,
    pub timestamp: i64,
    pub run_number: i64,
    pub total_runs: i64,
    pub hostname: Option<String>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub duration: f64,
}

impl Job {
    /// Queue a job for `device_axf_id`. The model type is read from the config.
    pub fn new(device_axf_id: &str, config: &Value, timestamp: i64) -> Result<Self, DomainError> {
        let mut job = Self {
            device_axf_id: device_axf_id.to_string(),
            config: config.to_string(),
            timestamp,
            ..Self::default()
        };
        job.update_model_type()?;
        Ok(job)
    }

    pub fn config_value(&self) -> Result<Value, DomainError> {
        Ok(serde_json::from_str(&self.config)?)
    }

    /// Model type is the first word of `OUTPUT_TYPE`, e.g. `"moment [Nm]"` -> moment.
    pub fn update_model_type(&mut self) -> Result<(), DomainError> {
        let config = self.config_value()?;
        let output = config
            .get(OUTPUT_TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DomainError::InvalidRecord(format!("job config has no {OUTPUT_TYPE_KEY}"))
            })?;
        let first = output.split_whitespace().next().unwrap_or_default();
        self.model_type = ModelType::from(first);
        Ok(())
    }

    /// Apply a status change and its timestamp side effects.
    ///
    /// Persisting the job, and releasing the client slot on interruption, is
    /// left to the caller.
    pub fn update_status(&mut self, status: impl Into<JobStatus>, hostname: Option<&str>) {
        let status = status.into();
        info!(job_id = %self.id, from = %self.status, to = %status, "job status change");
        let now = current_time();
        match status {
            JobStatus::Assigned => {
                self.assigned_at = Some(now);
                self.heartbeat();
            }
            JobStatus::Completed => self.completed_at = Some(now),
            JobStatus::Interrupted => self.interrupted_at = Some(now),
            _ => {}
        }
        self.status = status;
        if let Some(hostname) = hostname {
            info!(job_id = %self.id, hostname, "job assigned to host");
            self.hostname = Some(hostname.to_string());
        }
    }

    /// Begin run `run_number` and return it, marked current.
    ///
    /// Run 1 stamps `started_at`; an assigned job moves to running.
    pub fn start_run(&mut self, run_config: &RunConfig, run_number: i64) -> Run {
        info!(job_id = %self.id, run_number, "job starting run");
        let now = current_time();
        self.run_number = run_number;
        if run_number == 1 {
            self.started_at = Some(now);
            self.status = JobStatus::Running;
            info!(job_id = %self.id, "first run began; job running");
        }
        if self.status == JobStatus::Assigned {
            self.status = JobStatus::Running;
            info!(job_id = %self.id, "new run on assigned job; job running");
        }
        let mut run = Run::new(&self.id, run_number);
        run.initialize_from_config(run_config);
        run.is_current = true;
        self.run_started_at = Some(now);
        run
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Some(current_time());
        info!(job_id = %self.id, "heartbeat updated");
    }

    /// Stamp completion; duration runs from assignment (or start) to now.
    pub fn complete(&mut self) {
        let now = current_time();
        info!(job_id = %self.id, "job completed");
        self.completed_at = Some(now);
        if let Some(from) = self.assigned_at.or(self.started_at) {
            self.duration = elapsed_seconds(&from, &now);
        }
    }

    pub fn to_simple(&self) -> SimpleJob {
        SimpleJob {
            id: self.id.clone(),
            device_id: self.device_axf_id.clone(),
            model_type: self.model_type.clone(),
            status: self.status.clone(),
            timestamp: self.timestamp,
            run_number: self.run_number,
            total_runs: self.total_runs,
            hostname: self.hostname.clone(),
            run_started_at: self.run_started_at,
            queued_at: Some(self.queued_at),
            assigned_at: self.assigned_at,
            completed_at: self.completed_at,
            last_heartbeat: self.last_heartbeat,
            duration: self.duration,
        }
    }
}

impl Entity for Job {
    const NAME: &'static str = "Job";
    const TABLE: &'static str = "jobs";

    fn columns() -> Vec<Column> {
        vec![
            Column::text("id").primary_key(),
            Column::text("device_axf_id").references("devices", "axf_id"),
            Column::text("model_type"),
            Column::text("config"),
            Column::text("status"),
            Column::datetime("created_at"),
            Column::datetime("updated_at"),
            Column::big_integer("timestamp"),
            Column::integer("run_number"),
            Column::integer("total_runs"),
            Column::datetime("run_started_at").nullable(),
            Column::datetime("queued_at"),
            Column::datetime("assigned_at").nullable(),
            Column::datetime("started_at").nullable(),
            Column::datetime("stopped_at").nullable(),
            Column::datetime("completed_at").nullable(),
            Column::datetime("last_heartbeat").nullable(),
            Column::datetime("interrupted_at").nullable(),
            Column::float("duration"),
            Column::text("hostname").nullable(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
