use crate::normalize::{ImageSource, NormalizedDescriptor};
use crate::types::{EnvId, ShortId};
use serde::Serialize;

/// Deterministic identity for an environment, derived from descriptor content.
///
/// Any edit to the descriptor (image, steps, artifacts, session endpoint,
/// resources) produces a different identity: an edited descriptor is a new
/// environment, never an in-place mutation of an existing one.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvIdentity {
    pub env_id: EnvId,
    pub short_id: ShortId,
}

pub fn compute_env_id(normalized: &NormalizedDescriptor) -> Result<EnvIdentity, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();

    hasher.update(normalized.canonical_json()?.as_bytes());

    match &normalized.image {
        ImageSource::Registry { id } => {
            hasher.update(format!("image:registry:{id}").as_bytes());
        }
        ImageSource::Pinned { url, checksum } => {
            hasher.update(format!("image:pinned:{url}:{checksum}").as_bytes());
        }
    }

    // Step order is part of the identity.
    for labeled in &normalized.steps {
        hasher.update(format!("step:{}:{}", labeled.index, labeled.step).as_bytes());
    }

    for artifact in &normalized.artifacts {
        hasher.update(format!("artifact:{}:{}", artifact.name, artifact.checksum).as_bytes());
    }

    hasher.update(
        format!(
            "session:{}@{}",
            normalized.session.user,
            normalized.session.address()
        )
        .as_bytes(),
    );
    hasher.update(
        format!(
            "resources:{}:{}:{}",
            normalized.cpus, normalized.memory_mb, normalized.disk_gb
        )
        .as_bytes(),
    );

    let hex = hasher.finalize().to_hex().to_string();
    let short = hex[..12].to_owned();

    Ok(EnvIdentity {
        env_id: EnvId::new(hex),
        short_id: ShortId::new(short),
    })
}
