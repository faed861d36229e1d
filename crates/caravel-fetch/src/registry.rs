use crate::FetchError;
use caravel_schema::normalize::ImageSource;
use caravel_schema::types::{is_hex_digest, Checksum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A resolved, downloadable artifact: pinned URL plus content checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub name: String,
    pub url: String,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    pub url: String,
    pub checksum: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserRegistryFile {
    #[serde(default)]
    images: BTreeMap<String, RegistryEntry>,
}

/// Pinned base images known out of the box. Operators extend or override
/// these through the user registry file.
const BUILT_IN: &[(&str, &str, &str)] = &[
    (
        "ubuntu-24.04",
        "https://cloud-images.ubuntu.com/noble/20250710/noble-server-cloudimg-amd64.img",
        "4f1f2ae9b774dcb6b9e7ccd1b5d4a7e3c8a9f0b1d2e3f4a5b6c7d8e9f0a1b2c3",
    ),
    (
        "ubuntu-22.04",
        "https://cloud-images.ubuntu.com/jammy/20250701/jammy-server-cloudimg-amd64.img",
        "8e2d4c6b9a1f3e5d7c0b2a4f6e8d0c2b4a6f8e0d2c4b6a8f0e2d4c6b8a0f2e4d",
    ),
    (
        "debian-12",
        "https://cloud.debian.org/images/cloud/bookworm/20250703-2162/debian-12-generic-amd64-20250703-2162.qcow2",
        "1a3c5e7f9b0d2f4a6c8e0b2d4f6a8c0e2b4d6f8a0c2e4b6d8f0a2c4e6b8d0f2a",
    ),
    (
        "fedora-42",
        "https://download.fedoraproject.org/pub/fedora/linux/releases/42/Cloud/x86_64/images/Fedora-Cloud-Base-Generic-42-1.1.x86_64.qcow2",
        "5b7d9f1a3c5e7b9d1f3a5c7e9b1d3f5a7c9e1b3d5f7a9c1e3b5d7f9a1c3e5b7d",
    ),
    (
        "alma-9",
        "https://repo.almalinux.org/almalinux/9.6/cloud/x86_64/images/AlmaLinux-9-GenericCloud-9.6-20250522.x86_64.qcow2",
        "9c1e3b5d7f9a1c3e5b7d9f1a3c5e7b9d1f3a5c7e9b1d3f5a7c9e1b3d5f7a9c1e",
    ),
];

/// Maps declared image identifiers to pinned download URLs and checksums.
///
/// Resolution order: a `Pinned` image source wins outright; otherwise the
/// user registry file, then the built-in table. Lookup only, no side effects.
#[derive(Debug, Clone)]
pub struct ImageRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl ImageRegistry {
    /// Registry containing only the built-in pinned images.
    pub fn builtin() -> Self {
        let entries = BUILT_IN
            .iter()
            .map(|(id, url, checksum)| {
                (
                    (*id).to_owned(),
                    RegistryEntry {
                        url: (*url).to_owned(),
                        checksum: (*checksum).to_owned(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Built-in registry merged with the user registry file at `path`, if it
    /// exists. User entries override built-ins of the same id.
    pub fn load(path: &Path) -> Result<Self, FetchError> {
        let mut registry = Self::builtin();
        if !path.exists() {
            return Ok(registry);
        }
        let content = std::fs::read_to_string(path)?;
        let user: UserRegistryFile =
            toml::from_str(&content).map_err(|e| FetchError::Registry {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        for (id, entry) in user.images {
            let checksum = entry.checksum.trim().to_lowercase();
            if !is_hex_digest(&checksum) {
                return Err(FetchError::Registry {
                    path: path.display().to_string(),
                    reason: format!("image '{id}' has an invalid checksum"),
                });
            }
            registry.entries.insert(
                id,
                RegistryEntry {
                    url: entry.url.trim().to_owned(),
                    checksum,
                },
            );
        }
        Ok(registry)
    }

    /// Built-in registry merged with `~/.config/caravel/registry.toml`
    /// (overridable via `CARAVEL_REGISTRY`).
    pub fn load_default() -> Result<Self, FetchError> {
        Self::load(&default_registry_path())
    }

    /// Resolve a declared image source to a concrete artifact reference.
    pub fn resolve(&self, source: &ImageSource) -> Result<ArtifactRef, FetchError> {
        match source {
            ImageSource::Pinned { url, checksum } => Ok(ArtifactRef {
                name: "base image".to_owned(),
                url: url.clone(),
                checksum: checksum.clone(),
            }),
            ImageSource::Registry { id } => {
                let entry = self
                    .entries
                    .get(id)
                    .ok_or_else(|| FetchError::UnresolvedImage(id.clone()))?;
                Ok(ArtifactRef {
                    name: format!("base image {id}"),
                    url: entry.url.clone(),
                    checksum: Checksum::new(entry.checksum.clone()),
                })
            }
        }
    }

    /// All known image ids with their pinned URLs, sorted by id.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.as_str(), entry.url.as_str()))
            .collect()
    }
}

pub fn default_registry_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARAVEL_REGISTRY") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    PathBuf::from(home).join(".config/caravel/registry.toml")
}
