//! Request and response payloads shared by the API server and the dashboard.
//!
//! Entities serialize to their own response shape, so only payloads that are
//! not a full row live here.

use crate::domain::metrics::MetricsReport;
use crate::domain::run::RunConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub hostname: String,
    #[serde(default = "default_true")]
    pub daemon: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateClientStatusRequest {
    pub status: String,
    pub hostname: String,
}

/// One hostname or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShutdownTarget {
    One(String),
    Many(Vec<String>),
}

impl ShutdownTarget {
    pub fn hostnames(&self) -> Vec<&str> {
        match self {
            ShutdownTarget::One(h) => vec![h.as_str()],
            ShutdownTarget::Many(hs) => hs.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientShutdownRequest {
    #[serde(default)]
    pub hostname: Option<String>,
    pub target: ShutdownTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub shutdown: bool,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub hostname: String,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchJobRequest {
    pub hostname: String,
    pub daemon: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub job_id: String,
    pub status: String,
    pub timestamp: i64,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub hostname: String,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    pub hostname: String,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetJobStatus {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateJobProgressRequest {
    pub job_id: String,
    pub run_number: i64,
    pub total_runs: i64,
    pub run_config: RunConfig,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRunRequest {
    pub job_id: String,
    pub run_number: i64,
    pub train_metrics: MetricsReport,
    pub val_metrics: MetricsReport,
    pub test_metrics: MetricsReport,
    pub epochs_completed: i64,
    pub hostname: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_request_defaults_to_daemon() {
        let req: ClientRequest = serde_json::from_value(json!({"hostname": "rig-01"})).unwrap();
        assert!(req.daemon);
    }

    #[test]
    fn shutdown_target_accepts_one_or_many() {
        let one: ClientShutdownRequest =
            serde_json::from_value(json!({"target": "rig-01"})).unwrap();
        assert_eq!(one.target.hostnames(), vec!["rig-01"]);
        assert!(one.hostname.is_none());

        let many: ClientShutdownRequest =
            serde_json::from_value(json!({"hostname": "dash", "target": ["a", "b"]})).unwrap();
        assert_eq!(many.target.hostnames(), vec!["a", "b"]);
    }

    #[test]
    fn complete_run_request_parses_metrics() {
        let req: CompleteRunRequest = serde_json::from_value(json!({
            "job_id": "job-1",
            "run_number": 2,
            "train_metrics": {},
            "val_metrics": {},
            "test_metrics": {"TE-all": {"mae": [0.1, 0.3]}},
            "epochs_completed": 12,
            "hostname": "rig-01"
        }))
        .unwrap();
        assert_eq!(req.test_metrics.score(), Some(0.3));
    }
}
