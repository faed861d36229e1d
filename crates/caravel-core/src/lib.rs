//! Core orchestration engine for the Caravel environment lifecycle.
//!
//! This crate ties together descriptor parsing, the artifact cache, the
//! fetcher, and the session gateway into the `Engine` — the central API for
//! bringing an environment up, opening sessions into it, and inspecting or
//! forgetting it. It also provides the lifecycle state machine, the
//! strict-order provisioner, and operator-interrupt handling.

pub mod concurrency;
pub mod engine;
pub mod lifecycle;
pub mod provision;

pub use concurrency::{install_signal_handler, shutdown_requested, EnvLock};
pub use engine::{Engine, UpOptions, UpReport};
pub use lifecycle::validate_transition;
pub use provision::{apply_steps, render_step};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] caravel_schema::DescriptorError),
    #[error("store error: {0}")]
    Store(#[from] caravel_store::StoreError),
    #[error("fetch error: {0}")]
    Fetch(#[from] caravel_fetch::FetchError),
    #[error("gateway error: {0}")]
    Gateway(#[from] caravel_gateway::GatewayError),
    #[error("provisioning failed at step '{step}': {cause}")]
    ProvisioningFailed { step: String, cause: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("environment not found: {0}")]
    EnvNotFound(String),
    #[error("environment {env_id} is {state}, not ready; run `up` first")]
    NotReady { env_id: String, state: String },
    #[error("another operation is already running for environment {0}")]
    OperationInProgress(String),
    #[error("operation cancelled by operator")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
