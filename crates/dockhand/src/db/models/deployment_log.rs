//! Deployment log model.
//!
//! One record per orchestration attempt. Created `pending`, completed exactly
//! once, immutable afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Success,
    Failed,
}

text_enum!(DeploymentStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
});

/// What triggered a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    #[default]
    Api,
    Webhook,
    Manual,
}

text_enum!(TriggerType {
    Api => "api",
    Webhook => "webhook",
    Manual => "manual",
});

/// Deployment log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentLogRecord {
    pub id: i64,
    pub application_id: i64,
    pub deployment_id: Uuid,
    pub version: String,
    pub trigger_type: TriggerType,
    pub status: DeploymentStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl DeploymentLogRecord {
    pub fn is_completed(&self) -> bool {
        self.status != DeploymentStatus::Pending
    }

    /// Transition to a terminal status, computing the duration.
    ///
    /// Returns `false` without touching the record when it was already
    /// completed.
    pub fn complete(
        &mut self,
        status: DeploymentStatus,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status = status;
        self.error_message = error_message;
        self.completed_at = Some(completed_at);
        self.duration_ms = Some((completed_at - self.started_at).num_milliseconds().max(0));
        true
    }
}

/// Fields for a new `pending` log record.
#[derive(Debug, Clone)]
pub struct NewDeploymentLog {
    pub application_id: i64,
    pub deployment_id: Uuid,
    pub version: String,
    pub trigger_type: TriggerType,
    pub started_at: DateTime<Utc>,
}
