use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse descriptor: {0}")]
    ParseToml(#[from] Box<toml::de::Error>),
    #[error("unsupported descriptor_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("image section must declare either an `id` or a pinned `url` + `checksum`")]
    MissingImage,
    #[error("image section declares both `id` and `url`; pick one")]
    ConflictingImage,
    #[error("pinned image url '{0}' has no checksum")]
    MissingChecksum(String),
    #[error("invalid checksum '{0}': expected 64 lowercase hex characters")]
    InvalidChecksum(String),
    #[error("image url '{0}' must use http or https")]
    InvalidUrl(String),
    #[error("invalid environment name: {0}")]
    InvalidName(String),
    #[error("invalid resources: {0}")]
    InvalidResources(String),
    #[error("session.user must not be empty")]
    EmptySessionUser,
    #[error("session.port must not be 0")]
    InvalidPort,
    #[error("artifact '{name}': {reason}")]
    InvalidArtifact { name: String, reason: String },
    #[error("duplicate artifact name '{0}'")]
    DuplicateArtifact(String),
    #[error("step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
}

/// Raw, operator-authored environment descriptor (`caravel.toml`).
///
/// Section structure only; all semantic validation happens in
/// [`DescriptorV1::normalize`](crate::normalize).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DescriptorV1 {
    pub descriptor_version: u32,
    #[serde(default)]
    pub environment: EnvironmentSection,
    pub image: ImageSection,
    #[serde(default)]
    pub resources: ResourcesSection,
    pub session: SessionSection,
    #[serde(default)]
    pub artifacts: Vec<ArtifactSection>,
    #[serde(default)]
    pub steps: Vec<StepSection>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    #[serde(default)]
    pub name: Option<String>,
}

/// Either a registry identifier (`id`) or a pinned `url` + `checksum` pair.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResourcesSection {
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    #[serde(default = "default_disk_gb")]
    pub disk_gb: u64,
}

impl Default for ResourcesSection {
    fn default() -> Self {
        Self {
            cpus: default_cpus(),
            memory_mb: default_memory_mb(),
            disk_gb: default_disk_gb(),
        }
    }
}

fn default_cpus() -> u32 {
    2
}

fn default_memory_mb() -> u64 {
    2048
}

fn default_disk_gb() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default = "default_transport")]
    pub transport: String,
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    2222
}

fn default_transport() -> String {
    "ssh".to_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSection {
    pub name: String,
    pub url: String,
    pub checksum: String,
}

/// One `[[steps]]` entry. The `kind` discriminant selects which of the other
/// fields are required; normalization converts this into a
/// [`ProvisioningStep`](crate::steps::ProvisioningStep).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StepSection {
    #[serde(default)]
    pub name: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

pub fn parse_descriptor_str(input: &str) -> Result<DescriptorV1, DescriptorError> {
    toml::from_str(input).map_err(|e| DescriptorError::ParseToml(Box::new(e)))
}

pub fn parse_descriptor_file(path: impl AsRef<Path>) -> Result<DescriptorV1, DescriptorError> {
    let content = fs::read_to_string(path)?;
    parse_descriptor_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_descriptor() {
        let input = r#"
descriptor_version = 1

[environment]
name = "dev-vm"

[image]
id = "ubuntu-24.04"

[resources]
cpus = 4
memory_mb = 4096
disk_gb = 40

[session]
host = "127.0.0.1"
port = 2222
user = "ubuntu"
identity_file = "~/.ssh/id_ed25519"

[[artifacts]]
name = "tooling"
url = "https://example.com/tooling.tar.gz"
checksum = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"

[[steps]]
name = "base packages"
kind = "install_package"
package = "build-essential"

[[steps]]
kind = "write_file"
path = "/etc/motd"
contents = "managed by caravel\n"
mode = "0644"

[[steps]]
kind = "run_command"
command = "hostnamectl set-hostname dev"
"#;
        let d = parse_descriptor_str(input).expect("should parse");
        assert_eq!(d.descriptor_version, 1);
        assert_eq!(d.environment.name.as_deref(), Some("dev-vm"));
        assert_eq!(d.image.id.as_deref(), Some("ubuntu-24.04"));
        assert_eq!(d.resources.cpus, 4);
        assert_eq!(d.session.user, "ubuntu");
        assert_eq!(d.artifacts.len(), 1);
        assert_eq!(d.steps.len(), 3);
        assert_eq!(d.steps[0].name.as_deref(), Some("base packages"));
        assert_eq!(d.steps[1].mode.as_deref(), Some("0644"));
    }

    #[test]
    fn parses_minimal_descriptor() {
        let input = r#"
descriptor_version = 1

[image]
id = "ubuntu-24.04"

[session]
user = "ubuntu"
"#;
        let d = parse_descriptor_str(input).expect("should parse");
        assert_eq!(d.resources.cpus, 2);
        assert_eq!(d.resources.memory_mb, 2048);
        assert_eq!(d.session.host, "127.0.0.1");
        assert_eq!(d.session.port, 2222);
        assert_eq!(d.session.transport, "ssh");
        assert!(d.artifacts.is_empty());
        assert!(d.steps.is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
descriptor_version = 1

[image]
id = "ubuntu-24.04"
mystery = true

[session]
user = "ubuntu"
"#;
        assert!(parse_descriptor_str(input).is_err());
    }

    #[test]
    fn rejects_missing_session() {
        let input = r#"
descriptor_version = 1

[image]
id = "ubuntu-24.04"
"#;
        assert!(parse_descriptor_str(input).is_err());
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caravel.toml");
        fs::write(
            &path,
            "descriptor_version = 1\n[image]\nid = \"x\"\n[session]\nuser = \"u\"\n",
        )
        .unwrap();
        let d = parse_descriptor_file(&path).unwrap();
        assert_eq!(d.image.id.as_deref(), Some("x"));
    }

    #[test]
    fn parse_file_missing_is_io_error() {
        let result = parse_descriptor_file("/nonexistent/caravel.toml");
        assert!(matches!(result, Err(DescriptorError::Io(_))));
    }
}
