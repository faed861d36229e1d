use crate::transport::{Credentials, SessionTarget, SessionTransport};
use crate::GatewayError;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Session transport backed by the system `ssh` binary.
///
/// ssh reserves exit code 255 for its own failures (connection, host key,
/// authentication); any other exit code belongs to the remote command.
pub struct SshTransport {
    connect_timeout: Duration,
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
        }
    }

    fn base_args(target: &SessionTarget, creds: &Credentials, batch: bool) -> Vec<String> {
        let mut args = vec![
            "-p".to_owned(),
            target.port.to_string(),
            "-o".to_owned(),
            "StrictHostKeyChecking=accept-new".to_owned(),
        ];
        if batch {
            args.push("-o".to_owned());
            args.push("BatchMode=yes".to_owned());
        }
        if let Some(ref identity) = creds.identity_file {
            args.push("-i".to_owned());
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", creds.user, target.host));
        args
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTransport for SshTransport {
    fn name(&self) -> &str {
        "ssh"
    }

    fn probe(&self, target: &SessionTarget) -> Result<(), GatewayError> {
        let addr = target
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                GatewayError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("cannot resolve {}", target.address()),
                ))
            })?;
        TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        Ok(())
    }

    fn check_auth(&self, target: &SessionTarget, creds: &Credentials) -> Result<(), GatewayError> {
        let output = Command::new("ssh")
            .args(Self::base_args(target, creds, true))
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| GatewayError::Spawn {
                program: "ssh".to_owned(),
                source: e,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            tracing::debug!(
                "auth check failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Err(GatewayError::AuthenticationFailed {
                user: creds.user.clone(),
                endpoint: target.address(),
            })
        }
    }

    fn exec(
        &self,
        target: &SessionTarget,
        creds: &Credentials,
        command: &str,
    ) -> Result<i32, GatewayError> {
        let output = Command::new("ssh")
            .args(Self::base_args(target, creds, true))
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GatewayError::Spawn {
                program: "ssh".to_owned(),
                source: e,
            })?;

        let code = output.status.code().unwrap_or(-1);
        if code == 255 {
            // ssh's own failure, not the remote command's.
            tracing::warn!(
                "ssh transport failure: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(GatewayError::EnvironmentUnreachable {
                endpoint: target.address(),
                attempts: 1,
            });
        }
        if !output.stdout.is_empty() {
            tracing::debug!("remote stdout: {}", String::from_utf8_lossy(&output.stdout).trim());
        }
        if !output.stderr.is_empty() {
            tracing::debug!("remote stderr: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(code)
    }

    fn shell(&self, target: &SessionTarget, creds: &Credentials) -> Result<i32, GatewayError> {
        let status = Command::new("ssh")
            .arg("-t")
            .args(Self::base_args(target, creds, false))
            .status()
            .map_err(|e| GatewayError::Spawn {
                program: "ssh".to_owned(),
                source: e,
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}
