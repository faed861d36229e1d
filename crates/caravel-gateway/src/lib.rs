//! Session gateway for Caravel environments.
//!
//! Provides the `SessionTransport` seam between the orchestrator and a
//! provisioned environment: a cheap reachability probe, a one-shot
//! credential check, remote command execution, and interactive shells. The
//! production transport drives the system `ssh` binary; a scriptable mock
//! backs the test suites.

pub mod mock;
pub mod readiness;
pub mod ssh;
pub mod transport;

pub use mock::MockTransport;
pub use readiness::{wait_ready, ReadinessPolicy};
pub use ssh::SshTransport;
pub use transport::{
    open_session, select_transport, Credentials, SessionHandle, SessionTarget, SessionTransport,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("environment at {endpoint} unreachable after {attempts} attempt(s)")]
    EnvironmentUnreachable { endpoint: String, attempts: u32 },
    #[error("authentication failed for {user}@{endpoint}")]
    AuthenticationFailed { user: String, endpoint: String },
    #[error("unknown session transport '{0}'")]
    UnknownTransport(String),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
