use crate::CoreError;
use caravel_gateway::{Credentials, SessionTarget, SessionTransport};
use caravel_schema::steps::{LabeledStep, ProvisioningStep};

/// Quote a string for the remote POSIX shell.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Render a provisioning step to an idempotent remote shell command.
///
/// Package installation relies on the package manager's own idempotence;
/// file writes are full overwrites; raw commands carry the operator's
/// idempotence contract.
pub fn render_step(step: &ProvisioningStep) -> String {
    match step {
        ProvisioningStep::InstallPackage { package } => format!(
            "sudo env DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends {}",
            sh_quote(package)
        ),
        ProvisioningStep::WriteFile {
            path,
            contents,
            mode,
        } => {
            let mut cmd = format!(
                "printf %s {} | sudo tee {} > /dev/null",
                sh_quote(contents),
                sh_quote(path)
            );
            if let Some(mode) = mode {
                cmd.push_str(&format!(" && sudo chmod {mode:o} {}", sh_quote(path)));
            }
            cmd
        }
        ProvisioningStep::RunCommand { command } => command.clone(),
    }
}

/// Apply provisioning steps strictly in declared order.
///
/// The first failing step aborts the sequence; steps after it are never
/// attempted. Transport-level failures propagate as gateway errors; a
/// non-zero remote exit code is a provisioning failure naming the step.
pub fn apply_steps(
    transport: &dyn SessionTransport,
    target: &SessionTarget,
    creds: &Credentials,
    steps: &[LabeledStep],
) -> Result<(), CoreError> {
    let total = steps.len();
    for labeled in steps {
        let name = labeled.display_name();
        tracing::info!(
            step = labeled.index + 1,
            total,
            "provisioning: {name}"
        );
        let command = render_step(&labeled.step);
        let code = transport.exec(target, creds, &command)?;
        if code != 0 {
            return Err(CoreError::ProvisioningFailed {
                step: name,
                cause: format!("exit code {code}"),
            });
        }
    }
    Ok(())
}
