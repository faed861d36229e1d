use crate::transport::{Credentials, SessionTarget, SessionTransport};
use crate::GatewayError;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Scriptable in-process transport for tests.
///
/// Subprocess tests drive it through the environment:
/// `CARAVEL_MOCK_UNREACHABLE=1` makes every probe fail,
/// `CARAVEL_MOCK_AUTH_FAIL=1` fails the credential check,
/// `CARAVEL_MOCK_FAIL_EXEC=<substring>` makes matching commands exit 1, and
/// `CARAVEL_MOCK_EXEC_LOG=<path>` appends every executed command to a file.
pub struct MockTransport {
    unreachable_probes: AtomicU32,
    probes: AtomicU32,
    auth_ok: bool,
    fail_exec_containing: Option<String>,
    exec_log: Option<PathBuf>,
    executed: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            unreachable_probes: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            auth_ok: true,
            fail_exec_containing: None,
            exec_log: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn from_env() -> Self {
        let mut transport = Self::new();
        if std::env::var("CARAVEL_MOCK_UNREACHABLE").as_deref() == Ok("1") {
            transport.unreachable_probes = AtomicU32::new(u32::MAX);
        }
        if std::env::var("CARAVEL_MOCK_AUTH_FAIL").as_deref() == Ok("1") {
            transport.auth_ok = false;
        }
        if let Ok(needle) = std::env::var("CARAVEL_MOCK_FAIL_EXEC") {
            transport.fail_exec_containing = Some(needle);
        }
        if let Ok(path) = std::env::var("CARAVEL_MOCK_EXEC_LOG") {
            transport.exec_log = Some(PathBuf::from(path));
        }
        transport
    }

    /// Fail the first `n` probes (simulates a slow boot).
    pub fn with_unreachable_probes(self, n: u32) -> Self {
        self.unreachable_probes.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_auth_failure(mut self) -> Self {
        self.auth_ok = false;
        self
    }

    /// Commands containing `needle` exit with code 1.
    pub fn with_exec_failure_containing(mut self, needle: &str) -> Self {
        self.fail_exec_containing = Some(needle.to_owned());
        self
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    /// Commands executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("executed lock").clone()
    }

    fn record(&self, command: &str) {
        self.executed
            .lock()
            .expect("executed lock")
            .push(command.to_owned());
        if let Some(ref path) = self.exec_log {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                let _ = writeln!(file, "{command}");
            }
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn probe(&self, _target: &SessionTarget) -> Result<(), GatewayError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.unreachable_probes.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.unreachable_probes.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock endpoint not listening",
            )));
        }
        Ok(())
    }

    fn check_auth(&self, target: &SessionTarget, creds: &Credentials) -> Result<(), GatewayError> {
        if self.auth_ok {
            Ok(())
        } else {
            Err(GatewayError::AuthenticationFailed {
                user: creds.user.clone(),
                endpoint: target.address(),
            })
        }
    }

    fn exec(
        &self,
        _target: &SessionTarget,
        _creds: &Credentials,
        command: &str,
    ) -> Result<i32, GatewayError> {
        self.record(command);
        if let Some(ref needle) = self.fail_exec_containing {
            if command.contains(needle.as_str()) {
                return Ok(1);
            }
        }
        Ok(0)
    }

    fn shell(&self, _target: &SessionTarget, _creds: &Credentials) -> Result<i32, GatewayError> {
        self.record("<interactive shell>");
        Ok(0)
    }
}
