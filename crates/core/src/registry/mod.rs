//! Registry access: resolving references and fetching image configurations.
//!
//! - `reference`: parse and normalize `registry/repository:tag@digest`
//! - `auth`: credentials from Docker `config.json` and credential helpers
//! - `client`: Distribution API pull over blocking HTTP
//!
//! The decompiler only sees the [`ImageSource`] trait, so tests and other
//! frontends can substitute their own source of image configurations.

mod auth;
mod client;
mod reference;

use thiserror::Error;

use crate::model::ImageConfig;

pub use auth::{
    default_docker_config_path, Credential, Keychain, DEFAULT_HELPER_TIMEOUT, DOCKER_HUB_AUTH_KEY,
};
pub use client::{
    parse_challenge, verify_digest, Challenge, RegistryClient, MEDIA_TYPE_DOCKER_LIST,
    MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_MANIFEST,
};
pub use reference::{Reference, DOCKER_HUB, DOCKER_HUB_API_HOST};

/// Errors raised while resolving or fetching an image.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid authentication challenge: {0}")]
    InvalidChallenge(String),

    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported manifest media type: {0}")]
    UnsupportedMediaType(String),

    #[error("No manifest for platform {platform}; available: {}", available.join(", "))]
    NoMatchingPlatform { platform: String, available: Vec<String> },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Credential lookup failed: {0}")]
    Credentials(String),
}

/// Anything that can produce the configuration of an image.
pub trait ImageSource {
    fn fetch_config(&self, reference: &Reference) -> Result<ImageConfig, RegistryError>;
}

impl<T: ImageSource + ?Sized> ImageSource for &T {
    fn fetch_config(&self, reference: &Reference) -> Result<ImageConfig, RegistryError> {
        (**self).fetch_config(reference)
    }
}
