//! Client: a machine (daemon or interactive) that submits and runs jobs.

use crate::domain::record::{new_id, Entity};
use crate::domain::schema::Column;
use crate::utils::time::current_time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Lifecycle status stored in `clients.status`. Unknown strings survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClientStatus {
    Active,
    Inactive,
    ShuttingDown,
    Other(String),
}

impl ClientStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
            ClientStatus::ShuttingDown => "shutting_down",
            ClientStatus::Other(s) => s,
        }
    }
}

impl Default for ClientStatus {
    fn default() -> Self {
        ClientStatus::Active
    }
}

impl From<String> for ClientStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => ClientStatus::Active,
            "inactive" => ClientStatus::Inactive,
            "shutting_down" => ClientStatus::ShuttingDown,
            _ => ClientStatus::Other(s),
        }
    }
}

impl From<&str> for ClientStatus {
    fn from(s: &str) -> Self {
        ClientStatus::from(s.to_string())
    }
}

impl From<ClientStatus> for String {
    fn from(status: ClientStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    pub id: String,
    pub hostname: Option<String>,
    pub ip_address: String,
    pub daemon: bool,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_jobs: i64,
    pub total_duration: f64,
    pub active_jobs: i64,
    pub submitted_jobs: i64,
}

impl Default for Client {
    fn default() -> Self {
        let now = current_time();
        Self {
            id: new_id(),
            hostname: None,
            ip_address: String::new(),
            daemon: true,
            status: ClientStatus::Active,
            created_at: now,
            updated_at: now,
            completed_jobs: 0,
            total_duration: 0.0,
            active_jobs: 0,
            submitted_jobs: 0,
        }
    }
}

impl Client {
    pub fn new(hostname: Option<&str>, ip_address: &str, daemon: bool) -> Self {
        Self {
            hostname: hostname.map(String::from),
            ip_address: ip_address.to_string(),
            daemon,
            ..Self::default()
        }
    }

    /// Hostname for log lines; falls back to the IP for unnamed clients.
    pub fn display_name(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.ip_address)
    }

    /// Returns true if the hostname changed.
    pub fn update_hostname(&mut self, hostname: &str) -> bool {
        if self.hostname.as_deref() == Some(hostname) {
            return false;
        }
        info!(
            client = %self.display_name(),
            hostname,
            "updating client hostname"
        );
        self.hostname = Some(hostname.to_string());
        true
    }

    pub fn update_ip(&mut self, ip_address: &str) -> bool {
        if self.ip_address == ip_address {
            return false;
        }
        info!(
            client = %self.display_name(),
            ip_address,
            "updating client IP address"
        );
        self.ip_address = ip_address.to_string();
        true
    }

    pub fn mark_active(&mut self) {
        self.set_status(ClientStatus::Active);
    }

    pub fn mark_inactive(&mut self) {
        self.set_status(ClientStatus::Inactive);
    }

    /// Returns true if the status changed.
    pub fn update_status(&mut self, status: impl Into<ClientStatus>) -> bool {
        let status = status.into();
        if self.status == status {
            return false;
        }
        self.set_status(status);
        true
    }

    pub fn update_daemon(&mut self, daemon: bool) -> bool {
        if self.daemon == daemon {
            return false;
        }
        info!(client = %self.display_name(), daemon, "updating client daemon flag");
        self.daemon = daemon;
        true
    }

    pub fn shutdown_daemon(&mut self) {
        info!(client = %self.display_name(), "shutting down client daemon");
        self.status = ClientStatus::ShuttingDown;
    }

    /// A new job bumps `active_jobs`; a finished run adds its duration instead.
    pub fn update_job_tracking(&mut self, new_job: bool, duration: f64) {
        if new_job {
            self.active_jobs += 1;
        } else {
            self.total_duration += duration;
        }
    }

    pub fn complete_job(&mut self) {
        self.active_jobs = (self.active_jobs - 1).max(0);
        self.completed_jobs += 1;
    }

    pub fn remove_active_job(&mut self) {
        self.active_jobs = (self.active_jobs - 1).max(0);
    }

    fn set_status(&mut self, status: ClientStatus) {
        info!(
            client = %self.display_name(),
            from = %self.status,
            to = %status,
            "client status change"
        );
        self.status = status;
    }
}

impl Entity for Client {
    const NAME: &'static str = "Client";
    const TABLE: &'static str = "clients";

    fn columns() -> Vec<Column> {
        vec![
            Column::text("id").primary_key(),
            Column::text("hostname").nullable(),
            Column::text("ip_address"),
            Column::boolean("daemon"),
            Column::text("status"),
            Column::datetime("created_at"),
            Column::datetime("updated_at"),
            Column::integer("completed_jobs"),
            Column::float("total_duration"),
            Column::integer("active_jobs"),
            Column::integer("submitted_jobs"),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
