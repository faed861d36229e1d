use crate::descriptor::{DescriptorError, DescriptorV1, StepSection};
use crate::steps::{LabeledStep, ProvisioningStep};
use crate::types::{is_hex_digest, Checksum};
use serde::{Deserialize, Serialize};

/// Canonical, validated representation of a parsed descriptor.
///
/// Defaults are resolved, strings trimmed, artifacts sorted by name, and the
/// step list preserved in declared order (step order is semantic: later steps
/// may depend on earlier ones). This is the input to identity hashing and to
/// the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedDescriptor {
    pub descriptor_version: u32,
    pub name: Option<String>,
    pub image: ImageSource,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub session: SessionEndpoint,
    pub artifacts: Vec<NormalizedArtifact>,
    pub steps: Vec<LabeledStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ImageSource {
    /// Resolved through the image registry at run time.
    Registry { id: String },
    /// Pinned directly in the descriptor.
    Pinned { url: String, checksum: Checksum },
}

impl ImageSource {
    /// The identifier shown to the operator: the registry id or the pinned URL.
    pub fn display_id(&self) -> &str {
        match self {
            ImageSource::Registry { id } => id,
            ImageSource::Pinned { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<String>,
    pub transport: String,
}

impl SessionEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedArtifact {
    pub name: String,
    pub url: String,
    pub checksum: Checksum,
}

impl DescriptorV1 {
    /// Normalize the descriptor: validate every field, resolve defaults, and
    /// produce the canonical form.
    pub fn normalize(&self) -> Result<NormalizedDescriptor, DescriptorError> {
        if self.descriptor_version != 1 {
            return Err(DescriptorError::UnsupportedVersion(self.descriptor_version));
        }

        let name = match &self.environment.name {
            Some(raw) => {
                let trimmed = raw.trim().to_owned();
                validate_env_name(&trimmed)?;
                Some(trimmed)
            }
            None => None,
        };

        let image = normalize_image(self)?;
        validate_resources(&self.resources)?;

        let user = self.session.user.trim().to_owned();
        if user.is_empty() {
            return Err(DescriptorError::EmptySessionUser);
        }
        if self.session.port == 0 {
            return Err(DescriptorError::InvalidPort);
        }
        let session = SessionEndpoint {
            host: self.session.host.trim().to_owned(),
            port: self.session.port,
            user,
            identity_file: self
                .session
                .identity_file
                .as_ref()
                .map(|p| p.trim().to_owned()),
            transport: self.session.transport.trim().to_lowercase(),
        };

        let mut artifacts = Vec::with_capacity(self.artifacts.len());
        for a in &self.artifacts {
            let art_name = a.name.trim().to_owned();
            if art_name.is_empty() {
                return Err(DescriptorError::InvalidArtifact {
                    name: a.name.clone(),
                    reason: "name must not be empty".to_owned(),
                });
            }
            let url = a.url.trim().to_owned();
            validate_url(&url)?;
            let checksum = a.checksum.trim().to_lowercase();
            if !is_hex_digest(&checksum) {
                return Err(DescriptorError::InvalidChecksum(a.checksum.clone()));
            }
            if artifacts
                .iter()
                .any(|existing: &NormalizedArtifact| existing.name == art_name)
            {
                return Err(DescriptorError::DuplicateArtifact(art_name));
            }
            artifacts.push(NormalizedArtifact {
                name: art_name,
                url,
                checksum: Checksum::new(checksum),
            });
        }
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));

        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, section) in self.steps.iter().enumerate() {
            steps.push(LabeledStep {
                index,
                label: section.name.as_ref().map(|n| n.trim().to_owned()),
                step: normalize_step(index, section)?,
            });
        }

        Ok(NormalizedDescriptor {
            descriptor_version: self.descriptor_version,
            name,
            image,
            cpus: self.resources.cpus,
            memory_mb: self.resources.memory_mb,
            disk_gb: self.resources.disk_gb,
            session,
            artifacts,
            steps,
        })
    }
}

impl NormalizedDescriptor {
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn validate_env_name(name: &str) -> Result<(), DescriptorError> {
    if name.is_empty() || name.len() > 64 {
        return Err(DescriptorError::InvalidName(
            "environment name must be 1-64 characters".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(DescriptorError::InvalidName(
            "environment name must match [a-zA-Z0-9_-]".to_owned(),
        ));
    }
    Ok(())
}

fn normalize_image(d: &DescriptorV1) -> Result<ImageSource, DescriptorError> {
    let id = d.image.id.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty());
    let url = d.image.url.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty());

    match (id, url) {
        (Some(_), Some(_)) => Err(DescriptorError::ConflictingImage),
        (None, None) => Err(DescriptorError::MissingImage),
        (Some(id), None) => Ok(ImageSource::Registry { id: id.to_owned() }),
        (None, Some(url)) => {
            validate_url(url)?;
            let checksum = d
                .image
                .checksum
                .as_ref()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .ok_or_else(|| DescriptorError::MissingChecksum(url.to_owned()))?;
            if !is_hex_digest(&checksum) {
                return Err(DescriptorError::InvalidChecksum(checksum));
            }
            Ok(ImageSource::Pinned {
                url: url.to_owned(),
                checksum: Checksum::new(checksum),
            })
        }
    }
}

fn validate_url(url: &str) -> Result<(), DescriptorError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(DescriptorError::InvalidUrl(url.to_owned()))
    }
}

fn validate_resources(
    r: &crate::descriptor::ResourcesSection,
) -> Result<(), DescriptorError> {
    if r.cpus < 1 {
        return Err(DescriptorError::InvalidResources(
            "cpus must be at least 1".to_owned(),
        ));
    }
    if r.memory_mb < 128 {
        return Err(DescriptorError::InvalidResources(
            "memory_mb must be at least 128".to_owned(),
        ));
    }
    if r.disk_gb < 1 {
        return Err(DescriptorError::InvalidResources(
            "disk_gb must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

fn normalize_step(index: usize, s: &StepSection) -> Result<ProvisioningStep, DescriptorError> {
    let required = |field: Option<&String>, what: &str| -> Result<String, DescriptorError> {
        field
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DescriptorError::InvalidStep {
                index,
                reason: format!("kind '{}' requires a non-empty `{what}`", s.kind),
            })
    };

    match s.kind.trim() {
        "install_package" => Ok(ProvisioningStep::InstallPackage {
            package: required(s.package.as_ref(), "package")?,
        }),
        "write_file" => {
            let path = required(s.path.as_ref(), "path")?;
            let contents = s.contents.clone().ok_or_else(|| DescriptorError::InvalidStep {
                index,
                reason: "kind 'write_file' requires `contents`".to_owned(),
            })?;
            let mode = match &s.mode {
                None => None,
                Some(raw) => Some(parse_mode(index, raw)?),
            };
            Ok(ProvisioningStep::WriteFile {
                path,
                contents,
                mode,
            })
        }
        "run_command" => Ok(ProvisioningStep::RunCommand {
            command: required(s.command.as_ref(), "command")?,
        }),
        other => Err(DescriptorError::InvalidStep {
            index,
            reason: format!(
                "unknown kind '{other}', expected install_package, write_file, or run_command"
            ),
        }),
    }
}

fn parse_mode(index: usize, raw: &str) -> Result<u32, DescriptorError> {
    let digits = raw.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|m| *m <= 0o7777)
        .ok_or_else(|| DescriptorError::InvalidStep {
            index,
            reason: format!("invalid file mode '{raw}', expected octal like \"0644\""),
        })
}
