use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::RegistryError;

/// Registry name Docker Hub references normalize to.
pub const DOCKER_HUB: &str = "docker.io";

/// Host serving the Docker Hub registry API.
pub const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

const DEFAULT_TAG: &str = "latest";
const MAX_NAME_LEN: usize = 255;

/// Parsed, normalized image locator.
///
/// `nginx` becomes `docker.io/library/nginx:latest`; references carrying a
/// digest keep it and resolve by digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

struct Patterns {
    domain: Regex,
    component: Regex,
    tag: Regex,
    digest: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        domain: Regex::new(
            r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?$",
        )
        .expect("Invalid domain Regex"),
        component: Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$")
            .expect("Invalid path component Regex"),
        tag: Regex::new(r"^\w[\w.-]{0,127}$").expect("Invalid tag Regex"),
        digest: Regex::new(r"^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:[a-zA-Z0-9=_-]{32,}$")
            .expect("Invalid digest Regex"),
    })
}

impl Reference {
    /// Parse and normalize an image reference string.
    pub fn parse(name: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("reference is empty"));
        }
        let p = patterns();

        let (remainder, digest) = match name.split_once('@') {
            Some((rest, digest)) => {
                if !p.digest.is_match(digest) {
                    return Err(invalid("invalid digest"));
                }
                (rest, Some(digest.to_string()))
            }
            None => (name, None),
        };

        // A colon after the last slash separates the tag; earlier colons are ports.
        let last_slash = remainder.rfind('/').map_or(0, |idx| idx + 1);
        let (path, tag) = match remainder[last_slash..].rfind(':') {
            Some(idx) => {
                let split = last_slash + idx;
                let tag = &remainder[split + 1..];
                if !p.tag.is_match(tag) {
                    return Err(invalid("invalid tag"));
                }
                (&remainder[..split], Some(tag.to_string()))
            }
            None => (remainder, None),
        };

        if path.len() > MAX_NAME_LEN {
            return Err(invalid("repository name is too long"));
        }

        let (registry, repository) = match path.split_once('/') {
            Some((first, rest)) if is_domain(first) => {
                if !p.domain.is_match(first) {
                    return Err(invalid("invalid registry host"));
                }
                (first.to_ascii_lowercase(), rest.to_string())
            }
            _ => (DOCKER_HUB.to_string(), path.to_string()),
        };
        let registry = match registry.as_str() {
            "index.docker.io" | "registry-1.docker.io" => DOCKER_HUB.to_string(),
            _ => registry,
        };
        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };

        if repository.is_empty() || !repository.split('/').all(|c| p.component.is_match(c)) {
            return Err(invalid("repository must be lowercase alphanumeric path components"));
        }

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };
        Ok(Self { registry, repository, tag, digest })
    }

    /// Host that serves the registry API.
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }

    /// Manifest identifier: the digest when present, otherwise the tag.
    pub fn identifier(&self) -> &str {
        self.digest.as_deref().or(self.tag.as_deref()).unwrap_or(DEFAULT_TAG)
    }

    /// Token scope requesting pull access to this repository.
    pub fn pull_scope(&self) -> String {
        format!("repository:{}:pull", self.repository)
    }
}

fn is_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Reference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
