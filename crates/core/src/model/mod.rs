//! Image model: the parts of an OCI/Docker image the decompiler reads.
//!
//! - `ImageConfig` / `HistoryRecord`: the configuration blob.
//! - `ImageManifest` / `ImageIndex` / `Descriptor`: manifests used to locate it.
//! - `Platform`: the `os/architecture[/variant]` triple used to pick a
//!   manifest out of a multi-platform index.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One layer's recorded build metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Set when the step produced no filesystem layer (ENV, CMD, ...).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_layer: bool,
}

impl HistoryRecord {
    pub fn new(created: Option<DateTime<Utc>>, created_by: impl Into<String>) -> Self {
        Self { created, created_by: Some(created_by.into()), ..Self::default() }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Runtime configuration embedded in the image config (`config` key).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "User", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// The image configuration blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

impl ImageConfig {
    /// Effective runtime user; empty when the image does not set one.
    pub fn runtime_user(&self) -> &str {
        self.config.user.as_deref().unwrap_or_default()
    }
}

/// Content descriptor pointing at a manifest or blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Single-platform image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// Multi-platform index (OCI index or Docker manifest list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    #[serde(default)]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

impl ImageIndex {
    /// Pick the manifest for `platform`.
    ///
    /// An exact `os/architecture/variant` match wins. When `platform` names no
    /// variant, the first entry matching on os and architecture is taken.
    pub fn select(&self, platform: &Platform) -> Option<&Descriptor> {
        let candidates: Vec<(&Descriptor, &Platform)> = self
            .manifests
            .iter()
            .filter_map(|d| d.platform.as_ref().map(|p| (d, p)))
            .filter(|(_, p)| p.os == platform.os && p.architecture == platform.architecture)
            .collect();
        let exact = candidates.iter().find(|(_, p)| p.variant == platform.variant);
        match (exact, platform.variant.is_none()) {
            (Some((descriptor, _)), _) => Some(*descriptor),
            (None, true) => candidates.first().map(|(descriptor, _)| *descriptor),
            (None, false) => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid platform '{0}'; expected os/architecture[/variant]")]
pub struct PlatformParseError(pub String);

/// Target platform triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self { os: os.into(), architecture: architecture.into(), variant: None }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new("linux", "amd64")
    }
}

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PlatformParseError(s.to_string()));
        }
        match parts.as_slice() {
            [os, arch] => Ok(Self::new(*os, *arch)),
            [os, arch, variant] => {
                Ok(Self { variant: Some((*variant).to_string()), ..Self::new(*os, *arch) })
            }
            _ => Err(PlatformParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}
