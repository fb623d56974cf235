//! Cluster lifecycle error types

use crate::plan::ActionKind;
use std::time::Duration;
use thiserror::Error;

/// Cluster lifecycle errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid cluster spec: {0}")]
    Validation(String),

    #[error("Failed to fetch status of {target}: {source}")]
    TransientFetch {
        target: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Timeout after {timeout:?} waiting for {target} to become {expected} (last status: {last_status})")]
    Timeout {
        target: String,
        expected: String,
        last_status: String,
        timeout: Duration,
    },

    #[error("{target} entered unexpected status {status} while waiting for {expected}")]
    UnexpectedState {
        target: String,
        status: String,
        expected: String,
    },

    #[error("Cluster {cluster_id} is not ready (status: {status})")]
    NotReady { cluster_id: String, status: String },

    #[error("Cancelled while waiting for {target}")]
    Cancelled { target: String },

    #[error("Invalid shrink options for shard {shard_id}: {reason}")]
    ShrinkOptions { shard_id: String, reason: String },

    #[error("Shard {shard_id} not found in cluster {cluster_id}")]
    ShardNotFound { cluster_id: String, shard_id: String },

    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("{}: {source}", describe_action(.kind, .cluster_id, .shard_id))]
    Action {
        kind: ActionKind,
        cluster_id: String,
        shard_id: Option<String>,
        #[source]
        source: Box<CloudError>,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap an error as the failure of one update action
    pub fn action(
        kind: ActionKind,
        cluster_id: impl Into<String>,
        shard_id: Option<&str>,
        source: CloudError,
    ) -> Self {
        CloudError::Action {
            kind,
            cluster_id: cluster_id.into(),
            shard_id: shard_id.map(str::to_string),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same operation later can succeed without changing input
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::TransientFetch { .. }
            | CloudError::Timeout { .. }
            | CloudError::NotReady { .. } => true,
            CloudError::Action { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether the remote side reported the cluster as gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::ClusterNotFound(_))
    }

    /// The innermost cause, skipping action wrappers
    pub fn root_cause(&self) -> &CloudError {
        match self {
            CloudError::Action { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn describe_action(kind: &ActionKind, cluster_id: &str, shard_id: &Option<String>) -> String {
    match shard_id {
        Some(shard) => format!(
            "error {} on shard {} of cluster {}",
            kind.verb(),
            shard,
            cluster_id
        ),
        None => format!("error {} on cluster {}", kind.verb(), cluster_id),
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
