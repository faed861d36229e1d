use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated, ordered unit of provisioning work.
///
/// Steps are applied strictly in declared order and must be safe to re-run
/// from scratch: installing an already-installed package and rewriting a file
/// with identical content are no-ops, and `RunCommand` carries the operator's
/// own idempotence contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisioningStep {
    InstallPackage {
        package: String,
    },
    WriteFile {
        path: String,
        contents: String,
        /// Octal permission bits, e.g. `0o644`. `None` leaves the target's default.
        mode: Option<u32>,
    },
    RunCommand {
        command: String,
    },
}

impl ProvisioningStep {
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisioningStep::InstallPackage { .. } => "install_package",
            ProvisioningStep::WriteFile { .. } => "write_file",
            ProvisioningStep::RunCommand { .. } => "run_command",
        }
    }

    /// Short human-readable description used in progress output and failure
    /// reports.
    pub fn summary(&self) -> String {
        match self {
            ProvisioningStep::InstallPackage { package } => format!("install package {package}"),
            ProvisioningStep::WriteFile { path, .. } => format!("write file {path}"),
            ProvisioningStep::RunCommand { command } => {
                let trimmed = command.trim();
                let mut c: String = trimmed.chars().take(48).collect();
                if trimmed.chars().count() > 48 {
                    c.push('…');
                }
                format!("run `{c}`")
            }
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// A step with its position and optional operator-supplied label, as carried
/// through normalization and reported on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabeledStep {
    pub index: usize,
    pub label: Option<String>,
    pub step: ProvisioningStep,
}

impl LabeledStep {
    /// The label if the operator gave one, otherwise the step summary.
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.step.summary())
    }
}
