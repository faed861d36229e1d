use crate::CoreError;
use caravel_store::RunState;

/// Validate an orchestrator state transition.
///
/// Transitions are strictly forward (`NotStarted` → `Resolving` → `Fetching`
/// → `Provisioning` → `Ready`); `Failed` is reachable from any non-terminal
/// state; a failed environment restarts only at `Resolving`. `Ready` is
/// terminal success.
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (RunState::NotStarted, RunState::Resolving)
            | (RunState::Resolving, RunState::Fetching)
            | (RunState::Fetching, RunState::Provisioning)
            | (RunState::Provisioning, RunState::Ready)
            | (
                RunState::NotStarted
                    | RunState::Resolving
                    | RunState::Fetching
                    | RunState::Provisioning,
                RunState::Failed
            )
            | (RunState::Failed, RunState::Resolving)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
