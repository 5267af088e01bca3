//! Deploys monitoring-agent plugin files and keeps them converged.
//!
//! A declared plugin is resolved to a directory (explicit, or derived from the
//! client config location), checked against the agent's plugin search path,
//! written only when its content differs, and a reload is fired exactly when
//! the content changed. Units run immediately at declaration or wait for a
//! later convergence sweep.

pub mod config;
pub mod deploy;
pub mod error;
pub mod facts;
pub mod logging;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod resolve;
pub mod schedule;
pub mod source;

pub use error::{DeployError, ErrorKind};
