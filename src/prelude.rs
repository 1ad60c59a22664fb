//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use multicluster_secret_controller::prelude::*;
//! ```

// Controller and its collaborators
pub use crate::controller::client::{BuildError, ClientBuilder, KubeconfigClientBuilder};
pub use crate::controller::handler::{ClusterHandler, LoggingClusterHandler};
pub use crate::controller::registry::{ClusterRecord, ClusterRegistry, ClusterSummary, ClusterView};
pub use crate::controller::store::{SecretStore, StoreError};
pub use crate::controller::{ControllerError, SecretController};

// Reconciler types
pub use crate::controller::reconciler::{KeyState, Reconciler, ReconcilerError, SyncReport};

// Config types
pub use crate::config::{ControllerConfig, ServerConfig};

pub use crate::runtime::watch_loop::start_secret_controller;
