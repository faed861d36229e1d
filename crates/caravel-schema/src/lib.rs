//! Environment descriptor parsing, validation, and identity hashing for Caravel.
//!
//! This crate owns the operator-facing `caravel.toml` format: the raw
//! `DescriptorV1` sections, the validated `NormalizedDescriptor` that the rest
//! of the system consumes, the ordered provisioning step model, and the
//! deterministic environment identity derived from descriptor content.

pub mod descriptor;
pub mod identity;
pub mod normalize;
pub mod steps;
pub mod types;

pub use descriptor::{
    parse_descriptor_file, parse_descriptor_str, DescriptorError, DescriptorV1,
};
pub use identity::{compute_env_id, EnvIdentity};
pub use normalize::{ImageSource, NormalizedArtifact, NormalizedDescriptor, SessionEndpoint};
pub use steps::ProvisioningStep;
pub use types::{Checksum, EnvId, ShortId};
