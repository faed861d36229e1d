use crate::readiness::{wait_ready, ReadinessPolicy};
use crate::GatewayError;
use caravel_schema::normalize::SessionEndpoint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network endpoint of a provisioned environment's login service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTarget {
    pub host: String,
    pub port: u16,
}

impl SessionTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&SessionEndpoint> for SessionTarget {
    fn from(endpoint: &SessionEndpoint) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
        }
    }
}

/// Operator credentials for the session transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl From<&SessionEndpoint> for Credentials {
    fn from(endpoint: &SessionEndpoint) -> Self {
        Self {
            user: endpoint.user.clone(),
            identity_file: endpoint.identity_file.as_ref().map(PathBuf::from),
        }
    }
}

/// Seam between the orchestrator and the remote environment.
///
/// Implementations must not retry internally: bounded retry policy lives in
/// [`wait_ready`](crate::readiness::wait_ready), and authentication failures
/// are surfaced to the operator rather than retried.
pub trait SessionTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap reachability check of the endpoint (no credentials involved).
    fn probe(&self, target: &SessionTarget) -> Result<(), GatewayError>;

    /// Verify credentials with a no-op remote command.
    fn check_auth(&self, target: &SessionTarget, creds: &Credentials) -> Result<(), GatewayError>;

    /// Run a remote command and return its exit code.
    fn exec(
        &self,
        target: &SessionTarget,
        creds: &Credentials,
        command: &str,
    ) -> Result<i32, GatewayError>;

    /// Hand the terminal to an interactive session; returns its exit code.
    fn shell(&self, target: &SessionTarget, creds: &Credentials) -> Result<i32, GatewayError>;
}

pub fn select_transport(name: &str) -> Result<Box<dyn SessionTransport>, GatewayError> {
    match name {
        "ssh" => Ok(Box::new(crate::ssh::SshTransport::new())),
        "mock" => Ok(Box::new(crate::mock::MockTransport::from_env())),
        other => Err(GatewayError::UnknownTransport(other.to_owned())),
    }
}

/// One authenticated connection into a provisioned environment.
///
/// Created only after the endpoint answered the readiness probe and the
/// credential check; destroyed when the underlying session process exits.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub env_id: String,
    pub target: SessionTarget,
    pub credentials: Credentials,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

impl SessionHandle {
    pub fn shell(&self, transport: &dyn SessionTransport) -> Result<i32, GatewayError> {
        transport.shell(&self.target, &self.credentials)
    }

    pub fn exec(
        &self,
        transport: &dyn SessionTransport,
        command: &str,
    ) -> Result<i32, GatewayError> {
        transport.exec(&self.target, &self.credentials, command)
    }
}

/// Establish an authenticated session: poll readiness with bounded retries,
/// then verify credentials once.
pub fn open_session(
    transport: &dyn SessionTransport,
    env_id: &str,
    target: SessionTarget,
    credentials: Credentials,
    policy: &ReadinessPolicy,
) -> Result<SessionHandle, GatewayError> {
    wait_ready(transport, &target, policy)?;
    transport.check_auth(&target, &credentials)?;
    tracing::info!(env_id, endpoint = %target.address(), "session established");
    Ok(SessionHandle {
        env_id: env_id.to_owned(),
        target,
        credentials,
        opened_at: chrono::Utc::now(),
    })
}
