//! Shardflow cluster lifecycle
//!
//! This crate manages multi-shard managed database clusters against a remote
//! control plane: creating them, reconciling remote topology back into the
//! declared configuration, and applying incremental updates in place.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 shardflow CLI                    │
//! │        (validate / plan / reconcile / state)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                shardflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  ClusterOperator (create/read/update/…)  │   │
//! │  └──────┬──────────────┬───────────────┬────┘   │
//! │  ┌──────▼─────┐ ┌──────▼──────┐ ┌──────▼─────┐  │
//! │  │ translate  │ │ plan +      │ │ reconcile  │  │
//! │  │            │ │ executor    │ │            │  │
//! │  └────────────┘ └──────┬──────┘ └────────────┘  │
//! │                 ┌──────▼──────┐ ┌────────────┐  │
//! │                 │ StateWaiter │ │ State Mgmt │  │
//! │                 └──────┬──────┘ └────────────┘  │
//! └────────────────────────┼────────────────────────┘
//!                          │
//!                 ┌────────▼────────┐
//!                 │ trait ClusterApi│
//!                 │ (control plane) │
//!                 └─────────────────┘
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod executor;
pub mod operator;
pub mod plan;
pub mod poller;
pub mod reconcile;
pub mod spec;
pub mod state;
pub mod topology;
pub mod translate;

#[cfg(test)]
mod fixtures;

// Re-exports
pub use client::{AppliedCapability, ClusterAction, ClusterApi, RemoteCluster};
pub use context::{DEFAULT_OPERATION_TIMEOUT, OperatorContext, Timeouts};
pub use error::{CloudError, Result};
pub use executor::{ActionExecutor, ApplyResult};
pub use operator::ClusterOperator;
pub use plan::{ActionKind, PlanSummary, UpdateAction, UpdatePlan, plan};
pub use poller::{PollPolicy, StateWaiter};
pub use reconcile::{ReconciledShardView, overlay_declared, reconcile, refresh_spec};
pub use spec::{
    AutoExpand, Capability, ClusterSpec, Datastore, IMPORTED_VOLUME_TYPE, Network, RestorePoint,
    ShardSpec, Volume, WalVolume,
};
pub use state::{ClusterState, GlobalState, StateLock, StateManager};
pub use topology::{ClusterInstance, ClusterTopology, InstanceRole, InstanceView, OperationStatus};
pub use translate::{CreateRequest, InstanceRequest, translate};
