#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use unbake_core::registry::{Credential, Keychain, RegistryError};

fn write_helper(dir: &Path, name: &str, script: &str) {
    let path = dir.join(format!("docker-credential-{name}"));
    fs::write(&path, script).expect("write helper");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod helper");
}

// One test per binary: it rewrites PATH for the whole process.
#[test]
fn credential_helpers_run_under_a_deadline() {
    let dir = tempdir().expect("tempdir");
    write_helper(
        dir.path(),
        "unbake-ok",
        "#!/bin/sh\ncat >/dev/null\nprintf '{\"Username\":\"bot\",\"Secret\":\"pw\"}'\n",
    );
    write_helper(dir.path(), "unbake-hang", "#!/bin/sh\nexec sleep 5\n");
    let path = std::env::var_os("PATH").unwrap_or_default();
    let mut entries = vec![dir.path().to_path_buf()];
    entries.extend(std::env::split_paths(&path));
    std::env::set_var("PATH", std::env::join_paths(entries).expect("join PATH"));

    let keychain = Keychain::from_json(
        r#"{ "credHelpers": { "ghcr.io": "unbake-ok", "quay.io": "unbake-hang" } }"#,
    )
    .expect("keychain")
    .with_helper_timeout(Duration::from_millis(200));

    assert_eq!(
        keychain.resolve("ghcr.io").expect("resolve"),
        Credential::Basic { username: "bot".into(), password: "pw".into() }
    );

    let started = Instant::now();
    let err = keychain.resolve("quay.io").unwrap_err();
    assert!(matches!(err, RegistryError::Credentials(_)));
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(started.elapsed() < Duration::from_secs(4), "helper was not killed in time");
}
