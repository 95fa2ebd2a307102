use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{Credential, ImageSource, Keychain, Reference, RegistryError};
use crate::config::RegistrySettings;
use crate::model::{ImageConfig, ImageIndex, ImageManifest};

pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_DOCKER_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

const MANIFEST_ACCEPT: [&str; 4] = [
    MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_DOCKER_LIST,
    MEDIA_TYPE_OCI_MANIFEST,
    MEDIA_TYPE_DOCKER_MANIFEST,
];

/// Parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic,
    Bearer { realm: String, service: Option<String>, scope: Option<String> },
}

/// Parse a `WWW-Authenticate` header value.
pub fn parse_challenge(header: &str) -> Result<Challenge, RegistryError> {
    let header = header.trim();
    let (scheme, params) = header.split_once(char::is_whitespace).unwrap_or((header, ""));
    let params = parse_params(params);
    match scheme.to_ascii_lowercase().as_str() {
        "basic" => Ok(Challenge::Basic),
        "bearer" => {
            let realm = params.get("realm").cloned().ok_or_else(|| {
                RegistryError::InvalidChallenge(format!("missing realm in {header:?}"))
            })?;
            Ok(Challenge::Bearer {
                realm,
                service: params.get("service").cloned(),
                scope: params.get("scope").cloned(),
            })
        }
        other => Err(RegistryError::InvalidChallenge(format!("unsupported scheme {other:?}"))),
    }
}

/// `key=value` / `key="quoted, value"` list of an auth challenge.
fn parse_params(text: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => value.extend(chars.next()),
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
        }
        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

enum Manifest {
    Image(ImageManifest),
    Index(ImageIndex),
}

/// Authorization state for one pull; never shared between pulls.
struct Session<'a> {
    reference: &'a Reference,
    authorization: Option<String>,
}

impl<'a> Session<'a> {
    fn new(reference: &'a Reference) -> Self {
        Self { reference, authorization: None }
    }
}

/// Blocking client for the registry pull API.
pub struct RegistryClient {
    http: Client,
    settings: RegistrySettings,
    keychain: Keychain,
}

impl RegistryClient {
    /// Client using credentials from the configured (or default) Docker config.
    pub fn new(settings: RegistrySettings) -> Result<Self, RegistryError> {
        let mut keychain = Keychain::load(settings.docker_config.as_deref())?;
        if let Some(timeout) = settings.request_timeout() {
            keychain = keychain.with_helper_timeout(timeout);
        }
        Self::with_keychain(settings, keychain)
    }

    pub fn with_keychain(
        settings: RegistrySettings,
        keychain: Keychain,
    ) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { http, settings, keychain })
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Resolve the single-platform manifest for `reference`.
    pub fn fetch_manifest(&self, reference: &Reference) -> Result<ImageManifest, RegistryError> {
        let mut session = Session::new(reference);
        self.resolve_manifest(&mut session)
    }

    fn base_url(&self, reference: &Reference) -> String {
        let host = reference.api_host();
        format!("{}://{}", self.scheme(host), host)
    }

    fn scheme(&self, host: &str) -> &'static str {
        let hostname = host.split(':').next().unwrap_or(host);
        let local = matches!(hostname, "localhost" | "127.0.0.1")
            || hostname.ends_with(".localhost")
            || hostname.ends_with(".local");
        if local || self.settings.is_insecure(host) {
            "http"
        } else {
            "https"
        }
    }

    fn request(&self, session: &Session<'_>, url: &str, accept: &str) -> RequestBuilder {
        let request = self.http.get(url).header(ACCEPT, accept);
        match &session.authorization {
            Some(value) => request.header(AUTHORIZATION, value.as_str()),
            None => request,
        }
    }

    /// GET `url`, answering one authentication challenge if the registry asks.
    fn send(
        &self,
        session: &mut Session<'_>,
        url: &str,
        accept: &str,
    ) -> Result<Response, RegistryError> {
        let response = self.request(session, url, accept).send()?;
        if response.status() != StatusCode::UNAUTHORIZED || session.authorization.is_some() {
            return Ok(response);
        }
        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RegistryError::Unauthorized(format!("{url} returned 401 without a challenge")))?;
        let challenge = parse_challenge(header)?;
        session.authorization = Some(self.authorize(session.reference, &challenge)?);
        Ok(self.request(session, url, accept).send()?)
    }

    fn authorize(
        &self,
        reference: &Reference,
        challenge: &Challenge,
    ) -> Result<String, RegistryError> {
        let credential = self.keychain.resolve(&reference.registry)?;
        match challenge {
            Challenge::Basic => match credential {
                Credential::Basic { username, password } => {
                    Ok(format!("Basic {}", STANDARD.encode(format!("{username}:{password}"))))
                }
                Credential::Anonymous => Err(RegistryError::Unauthorized(format!(
                    "{} requires credentials",
                    reference.registry
                ))),
            },
            Challenge::Bearer { realm, service, .. } => {
                debug!(%realm, "Requesting registry token");
                let scope = reference.pull_scope();
                let mut request = self.http.get(realm).query(&[("scope", scope.as_str())]);
                if let Some(service) = service {
                    request = request.query(&[("service", service.as_str())]);
                }
                if let Credential::Basic { username, password } = &credential {
                    request = request.basic_auth(username, Some(password));
                }
                let response = check_status(request.send()?, realm, "token")?;
                let body = response.bytes()?;
                let token: TokenResponse = serde_json::from_slice(&body)
                    .map_err(|source| RegistryError::Decode { what: "token response", source })?;
                let token = token
                    .token
                    .or(token.access_token)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        RegistryError::Unauthorized(format!("{realm} returned no token"))
                    })?;
                Ok(format!("Bearer {token}"))
            }
        }
    }

    fn resolve_manifest(&self, session: &mut Session<'_>) -> Result<ImageManifest, RegistryError> {
        let reference = session.reference;
        let index = match self.get_manifest(session, reference.identifier())? {
            Manifest::Image(manifest) => return Ok(manifest),
            Manifest::Index(index) => index,
        };

        let platform = &self.settings.platform;
        let descriptor = index.select(platform).ok_or_else(|| RegistryError::NoMatchingPlatform {
            platform: platform.to_string(),
            available: index
                .manifests
                .iter()
                .filter_map(|d| d.platform.as_ref().map(ToString::to_string))
                .collect(),
        })?;
        debug!(%platform, digest = %descriptor.digest, "Selected manifest from index");
        match self.get_manifest(session, &descriptor.digest)? {
            Manifest::Image(manifest) => Ok(manifest),
            Manifest::Index(_) => {
                Err(RegistryError::UnsupportedMediaType("nested image index".to_string()))
            }
        }
    }

    fn get_manifest(
        &self,
        session: &mut Session<'_>,
        identifier: &str,
    ) -> Result<Manifest, RegistryError> {
        let reference = session.reference;
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(reference),
            reference.repository,
            identifier
        );
        let response = self.send(session, &url, &MANIFEST_ACCEPT.join(", "))?;
        let response = check_status(response, &url, "manifest")?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .unwrap_or_default();
        let body = response.bytes()?;
        decode_manifest(&content_type, &body)
    }
}

impl ImageSource for RegistryClient {
    fn fetch_config(&self, reference: &Reference) -> Result<ImageConfig, RegistryError> {
        let mut session = Session::new(reference);
        let manifest = self.resolve_manifest(&mut session)?;
        let digest = &manifest.config.digest;
        let url = format!("{}/v2/{}/blobs/{}", self.base_url(reference), reference.repository, digest);
        info!(%digest, "Fetching image config blob");
        let response = check_status(self.send(&mut session, &url, "*/*")?, &url, "config blob")?;
        let body = response.bytes()?;
        verify_digest(digest, &body)?;
        serde_json::from_slice(&body)
            .map_err(|source| RegistryError::Decode { what: "image config", source })
    }
}

fn check_status(response: Response, url: &str, what: &str) -> Result<Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RegistryError::Unauthorized(format!("{what} at {url} ({status})")))
        }
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound(format!("{what} at {url}"))),
        _ => Err(RegistryError::Status { url: url.to_string(), status: status.as_u16() }),
    }
}

fn decode_manifest(content_type: &str, body: &[u8]) -> Result<Manifest, RegistryError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|source| RegistryError::Decode { what: "manifest", source })?;
    let media_type =
        value.get("mediaType").and_then(serde_json::Value::as_str).unwrap_or(content_type);
    let is_index = match media_type {
        MEDIA_TYPE_OCI_INDEX | MEDIA_TYPE_DOCKER_LIST => true,
        MEDIA_TYPE_OCI_MANIFEST | MEDIA_TYPE_DOCKER_MANIFEST => false,
        _ if value.get("manifests").is_some() => true,
        _ if value.get("config").is_some() => false,
        other => return Err(RegistryError::UnsupportedMediaType(other.to_string())),
    };
    if is_index {
        serde_json::from_value(value)
            .map(Manifest::Index)
            .map_err(|source| RegistryError::Decode { what: "image index", source })
    } else {
        serde_json::from_value(value)
            .map(Manifest::Image)
            .map_err(|source| RegistryError::Decode { what: "image manifest", source })
    }
}

/// Check `body` against a `sha256:<hex>` digest. Other algorithms are not
/// verified.
pub fn verify_digest(expected: &str, body: &[u8]) -> Result<(), RegistryError> {
    let Some(expected_hex) = expected.strip_prefix("sha256:") else {
        debug!(digest = expected, "Skipping verification of non-sha256 digest");
        return Ok(());
    };
    let actual = format!("{:x}", Sha256::digest(body));
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(RegistryError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("sha256:{actual}"),
        })
    }
}
