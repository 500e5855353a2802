//! Run: one training pass of a job with a fixed set of hyper-parameters.

use crate::domain::metrics::MetricsReport;
use crate::domain::record::{new_id, Entity};
use crate::domain::schema::Column;
use crate::utils::time::{current_time, elapsed_seconds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hyper-parameters a worker reports when it starts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub learning_rate: f64,
    pub activation: String,
    pub optimizer_name: String,
    pub layers: Vec<i64>,
    pub batch_size: i64,
    pub epochs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Run {
    pub id: String,
    pub job_id: String,
    pub number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration: f64,
    pub completed_at: Option<DateTime<Utc>>,

    pub learning_rate: Option<f64>,
    pub activation: Option<String>,
    pub optimizer: Option<String>,
    pub layers: Option<Vec<i64>>,
    pub batch_size: Option<i64>,
    pub epochs: Option<i64>,

    pub epochs_completed: i64,
    pub is_best: bool,
    pub is_current: bool,
    pub train_metrics: Option<MetricsReport>,
    pub val_metrics: Option<MetricsReport>,
    pub test_metrics: Option<MetricsReport>,
}

impl Default for Run {
    fn default() -> Self {
        let now = current_time();
        Self {
            id: new_id(),
            job_id: String::new(),
            number: 0,
            created_at: now,
            updated_at: now,
            duration: 0.0,
            completed_at: None,
            learning_rate: None,
            activation: None,
            optimizer: None,
            layers: None,
            batch_size: None,
            epochs: None,
            epochs_completed: 0,
            is_best: false,
            is_current: false,
            train_metrics: None,
            val_metrics: None,
            test_metrics: None,
        }
    }
}

impl Run {
    pub fn new(job_id: &str, number: i64) -> Self {
        Self {
            job_id: job_id.to_string(),
            number,
            ..Self::default()
        }
    }

    pub fn initialize_from_config(&mut self, config: &RunConfig) {
        self.learning_rate = Some(config.learning_rate);
        self.activation = Some(config.activation.clone());
        self.optimizer = Some(config.optimizer_name.clone());
        self.layers = Some(config.layers.clone());
        self.batch_size = Some(config.batch_size);
        self.epochs = Some(config.epochs);
    }

    /// Store the final metrics and stop being the job's current run.
    ///
    /// Best-run election needs the job's other runs and is done by the caller.
    pub fn complete(
        &mut self,
        epochs_completed: i64,
        train_metrics: MetricsReport,
        val_metrics: MetricsReport,
        test_metrics: MetricsReport,
    ) {
        let now = current_time();
        self.completed_at = Some(now);
        self.updated_at = now;
        self.duration = elapsed_seconds(&self.created_at, &now);
        self.epochs_completed = epochs_completed;
        self.is_current = false;
        self.train_metrics = Some(train_metrics);
        self.val_metrics = Some(val_metrics);
        self.test_metrics = Some(test_metrics);
        info!(job_id = %self.job_id, run = self.number, duration = self.duration, "run completed");
    }

    /// `TE-all` test MAE on the last axis, if the run has reported it.
    pub fn best_metric(&self) -> Option<f64> {
        self.test_metrics.as_ref()?.score()
    }
}

impl Entity for Run {
    const NAME: &'static str = "Run";
    const TABLE: &'static str = "runs";

    fn columns() -> Vec<Column> {
        vec![
            Column::text("id").primary_key(),
            Column::text("job_id").references("jobs", "id"),
            Column::integer("number"),
            Column::datetime("created_at"),
            Column::datetime("updated_at"),
            Column::float("duration"),
            Column::datetime("completed_at").nullable(),
            Column::float("learning_rate").nullable(),
            Column::text("activation").nullable(),
            Column::text("optimizer").nullable(),
            Column::json("layers").nullable(),
            Column::integer("batch_size").nullable(),
            Column::integer("epochs").nullable(),
            Column::integer("epochs_completed"),
            Column::boolean("is_best"),
            Column::boolean("is_current"),
            Column::json("train_metrics").nullable(),
            Column::json("val_metrics").nullable(),
            Column::json("test_metrics").nullable(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
