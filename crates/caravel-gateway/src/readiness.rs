use crate::transport::{SessionTarget, SessionTransport};
use crate::GatewayError;
use std::time::Duration;

/// Bounded polling policy for environment readiness.
#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(1),
        }
    }
}

/// Poll the endpoint until it answers or the attempt budget is spent.
///
/// Individual probe errors are expected while the environment boots; only
/// exhaustion is reported, as `EnvironmentUnreachable`.
pub fn wait_ready(
    transport: &dyn SessionTransport,
    target: &SessionTarget,
    policy: &ReadinessPolicy,
) -> Result<(), GatewayError> {
    for attempt in 1..=policy.max_attempts {
        match transport.probe(target) {
            Ok(()) => {
                tracing::debug!(endpoint = %target.address(), attempt, "endpoint answered");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(endpoint = %target.address(), attempt, "probe failed: {e}");
                if attempt < policy.max_attempts {
                    std::thread::sleep(policy.delay);
                }
            }
        }
    }
    Err(GatewayError::EnvironmentUnreachable {
        endpoint: target.address(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn target() -> SessionTarget {
        SessionTarget {
            host: "127.0.0.1".to_owned(),
            port: 2222,
        }
    }

    fn quick(max_attempts: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn immediate_readiness() {
        let transport = MockTransport::new();
        wait_ready(&transport, &target(), &quick(3)).unwrap();
        assert_eq!(transport.probe_count(), 1);
    }

    #[test]
    fn retries_until_ready() {
        let transport = MockTransport::new().with_unreachable_probes(2);
        wait_ready(&transport, &target(), &quick(5)).unwrap();
        assert_eq!(transport.probe_count(), 3, "two failures then success");
    }

    #[test]
    fn bounded_attempts_then_unreachable() {
        let transport = MockTransport::new().with_unreachable_probes(u32::MAX);
        let result = wait_ready(&transport, &target(), &quick(4));
        assert!(matches!(
            result,
            Err(GatewayError::EnvironmentUnreachable { attempts: 4, .. })
        ));
        assert_eq!(transport.probe_count(), 4, "never exceeds the budget");
    }

    #[test]
    fn default_policy_is_bounded() {
        let policy = ReadinessPolicy::default();
        assert!(policy.max_attempts > 0);
        assert!(policy.delay > Duration::ZERO);
    }
}
