//! Multicluster Secret Controller Library
//!
//! Watches labelled secrets in a control namespace, each holding kubeconfigs
//! for remote clusters, and keeps a registry of live clients to those
//! clusters in step with them.
//!
//! ## Quick Start
//!
//! ```rust
//! use multicluster_secret_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod runtime;
