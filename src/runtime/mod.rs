//! # Runtime
//!
//! Process-level plumbing around the controller.
//!
//! - `error_policy`: retry/give-up decision per processed key
//! - `initialization`: crypto provider, tracing, metrics, client and server startup
//! - `watch_loop`: secret watch → queue keys, production wiring

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
