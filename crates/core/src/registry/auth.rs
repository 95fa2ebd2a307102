use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use super::reference::{DOCKER_HUB, DOCKER_HUB_API_HOST};
use super::RegistryError;

/// Key Docker uses for Hub credentials in `config.json`.
pub const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

/// How long a `docker-credential-*` helper may run before it is killed.
pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(30);

const HELPER_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Credentials presented to a registry or its token service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credential {
    #[default]
    Anonymous,
    Basic {
        username: String,
        password: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,
    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelperResponse {
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Secret")]
    secret: String,
}

/// Credential lookup backed by a Docker `config.json`.
///
/// Per registry host the order is: `credHelpers[host]`, then `credsStore`,
/// then the inline `auths` entry. Anything not found is anonymous.
#[derive(Debug)]
pub struct Keychain {
    config: DockerConfigFile,
    helper_timeout: Duration,
}

impl Default for Keychain {
    fn default() -> Self {
        Self { config: DockerConfigFile::default(), helper_timeout: DEFAULT_HELPER_TIMEOUT }
    }
}

impl Keychain {
    /// Keychain with no credentials at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Limit how long a credential helper may run.
    pub fn with_helper_timeout(mut self, timeout: Duration) -> Self {
        self.helper_timeout = timeout;
        self
    }

    /// Load from `path`, or from the default Docker config location.
    ///
    /// A missing file yields an anonymous keychain; an unreadable or malformed
    /// one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        let path = match path.map(Path::to_path_buf).or_else(default_docker_config_path) {
            Some(path) => path,
            None => return Ok(Self::anonymous()),
        };
        if !path.is_file() {
            debug!(path = %path.display(), "No docker config found; using anonymous access");
            return Ok(Self::anonymous());
        }
        let body = std::fs::read_to_string(&path).map_err(|e| {
            RegistryError::Credentials(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&body)
    }

    /// Parse the contents of a Docker `config.json`.
    pub fn from_json(body: &str) -> Result<Self, RegistryError> {
        let config: DockerConfigFile = serde_json::from_str(body)
            .map_err(|e| RegistryError::Credentials(format!("invalid docker config: {e}")))?;
        Ok(Self { config, ..Self::default() })
    }

    /// Resolve credentials for a registry (as named in a [`super::Reference`]).
    pub fn resolve(&self, registry: &str) -> Result<Credential, RegistryError> {
        let aliases = host_aliases(registry);

        if let Some(helper) = lookup(&self.config.cred_helpers, &aliases) {
            return run_helper(helper, registry, self.helper_timeout);
        }
        if let Some(store) = &self.config.creds_store {
            match run_helper(store, registry, self.helper_timeout) {
                Ok(Credential::Anonymous) => {}
                Ok(credential) => return Ok(credential),
                Err(err) => warn!(%err, %store, "Credential store failed; trying inline auths"),
            }
        }
        match lookup(&self.config.auths, &aliases) {
            Some(entry) => decode_entry(entry),
            None => Ok(Credential::Anonymous),
        }
    }
}

fn lookup<'a, V>(map: &'a HashMap<String, V>, aliases: &[&str]) -> Option<&'a V> {
    map.iter()
        .find(|(key, _)| aliases.contains(&normalize_auth_key(key).as_str()))
        .map(|(_, value)| value)
}

/// `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`.
pub fn default_docker_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}

/// Strip scheme and path from a `config.json` key (`https://host/v1/` -> `host`).
fn normalize_auth_key(key: &str) -> String {
    let key = key.strip_prefix("https://").or_else(|| key.strip_prefix("http://")).unwrap_or(key);
    key.split('/').next().unwrap_or(key).to_ascii_lowercase()
}

fn host_aliases(registry: &str) -> Vec<&str> {
    if registry == DOCKER_HUB {
        vec![DOCKER_HUB, "index.docker.io", DOCKER_HUB_API_HOST]
    } else {
        vec![registry]
    }
}

fn decode_entry(entry: &AuthEntry) -> Result<Credential, RegistryError> {
    if let Some(encoded) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| RegistryError::Credentials(format!("invalid base64 auth: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| RegistryError::Credentials(format!("auth is not UTF-8: {e}")))?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            RegistryError::Credentials("auth must be base64 of username:password".to_string())
        })?;
        return Ok(Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    match (&entry.username, &entry.password) {
        (Some(username), Some(password)) => {
            Ok(Credential::Basic { username: username.clone(), password: password.clone() })
        }
        _ => Ok(Credential::Anonymous),
    }
}

/// Run `docker-credential-<helper> get` for `registry`, killing it after `timeout`.
fn run_helper(
    helper: &str,
    registry: &str,
    timeout: Duration,
) -> Result<Credential, RegistryError> {
    let program = format!("docker-credential-{helper}");
    let server = if registry == DOCKER_HUB { DOCKER_HUB_AUTH_KEY } else { registry };
    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RegistryError::Credentials(format!("failed to spawn {program}: {e}")))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(server.as_bytes())
            .map_err(|e| RegistryError::Credentials(format!("failed to write to {program}: {e}")))?;
    }
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);
    let status = wait_with_deadline(&mut child, &program, timeout)?;
    let stdout = collect(stdout_reader);
    let stderr = collect(stderr_reader);

    let stdout = String::from_utf8_lossy(&stdout);
    if !status.success() {
        if stdout.contains("credentials not found") {
            return Ok(Credential::Anonymous);
        }
        let stderr = String::from_utf8_lossy(&stderr);
        debug!(%program, stderr = %stderr.trim(), "Credential helper failed");
        return Err(RegistryError::Credentials(format!("{program} exited with {status}")));
    }
    let response: HelperResponse = serde_json::from_str(&stdout)
        .map_err(|e| RegistryError::Credentials(format!("invalid {program} output: {e}")))?;
    if response.username == "<token>" {
        // Identity tokens need an OAuth2 refresh exchange, which is not supported.
        debug!(%program, "Ignoring identity token returned by credential helper");
        return Ok(Credential::Anonymous);
    }
    Ok(Credential::Basic { username: response.username, password: response.secret })
}

fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    timeout: Duration,
) -> Result<std::process::ExitStatus, RegistryError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!(%program, ?timeout, "Credential helper timed out; killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(RegistryError::Credentials(format!(
                    "{program} timed out after {timeout:?}"
                )));
            }
            Ok(None) => thread::sleep(HELPER_POLL_INTERVAL),
            Err(e) => {
                return Err(RegistryError::Credentials(format!(
                    "failed to wait for {program}: {e}"
                )))
            }
        }
    }
}

/// Read a child pipe to the end on its own thread so the child never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
}
