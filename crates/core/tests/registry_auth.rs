use std::fs;

use tempfile::tempdir;
use unbake_core::registry::{Credential, Keychain, RegistryError};

fn basic(username: &str, password: &str) -> Credential {
    Credential::Basic { username: username.to_string(), password: password.to_string() }
}

#[test]
fn hub_credentials_match_every_hub_alias() {
    let keychain = Keychain::from_json(
        r#"{ "auths": { "https://index.docker.io/v1/": { "auth": "YWxpY2U6czNjcmV0" } } }"#,
    )
    .expect("keychain");
    assert_eq!(keychain.resolve("docker.io").expect("resolve"), basic("alice", "s3cret"));
}

#[test]
fn explicit_username_and_password_are_used() {
    let keychain = Keychain::from_json(
        r#"{ "auths": { "registry.example.com:5000": { "username": "ci", "password": "token" } } }"#,
    )
    .expect("keychain");
    assert_eq!(
        keychain.resolve("registry.example.com:5000").expect("resolve"),
        basic("ci", "token")
    );
    assert_eq!(keychain.resolve("registry.example.com").expect("resolve"), Credential::Anonymous);
}

#[test]
fn auth_keys_with_scheme_and_path_are_normalized() {
    let keychain = Keychain::from_json(
        r#"{ "auths": { "https://GHCR.io/v2/": { "auth": "YWxpY2U6czNjcmV0" } } }"#,
    )
    .expect("keychain");
    assert_eq!(keychain.resolve("ghcr.io").expect("resolve"), basic("alice", "s3cret"));
}

#[test]
fn unknown_registry_is_anonymous() {
    let keychain = Keychain::from_json(r#"{ "auths": {} }"#).expect("keychain");
    assert_eq!(keychain.resolve("quay.io").expect("resolve"), Credential::Anonymous);
    assert_eq!(Keychain::anonymous().resolve("docker.io").expect("resolve"), Credential::Anonymous);
}

#[test]
fn malformed_auth_entries_are_errors() {
    let keychain =
        Keychain::from_json(r#"{ "auths": { "quay.io": { "auth": "%%%" } } }"#).expect("keychain");
    assert!(matches!(keychain.resolve("quay.io"), Err(RegistryError::Credentials(_))));

    // "bm9jb2xvbg==" is "nocolon"
    let keychain = Keychain::from_json(r#"{ "auths": { "quay.io": { "auth": "bm9jb2xvbg==" } } }"#)
        .expect("keychain");
    assert!(matches!(keychain.resolve("quay.io"), Err(RegistryError::Credentials(_))));

    assert!(matches!(Keychain::from_json("not json"), Err(RegistryError::Credentials(_))));
}

#[test]
fn missing_credential_helper_is_an_error() {
    let keychain = Keychain::from_json(
        r#"{ "credHelpers": { "ghcr.io": "unbake-test-helper-that-does-not-exist" } }"#,
    )
    .expect("keychain");
    let err = keychain.resolve("ghcr.io").unwrap_err();
    assert!(err.to_string().contains("docker-credential-unbake-test-helper-that-does-not-exist"));
}

#[test]
fn failing_credential_store_falls_back_to_auths() {
    let keychain = Keychain::from_json(
        r#"{
          "credsStore": "unbake-test-store-that-does-not-exist",
          "auths": { "quay.io": { "username": "bot", "password": "pw" } }
        }"#,
    )
    .expect("keychain");
    assert_eq!(keychain.resolve("quay.io").expect("resolve"), basic("bot", "pw"));
}

#[test]
fn load_reads_config_file() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("config.json");
    fs::write(&path, r#"{ "auths": { "quay.io": { "auth": "YWxpY2U6czNjcmV0" } } }"#)
        .expect("write config");

    let keychain = Keychain::load(Some(path.as_path())).expect("load");
    assert_eq!(keychain.resolve("quay.io").expect("resolve"), basic("alice", "s3cret"));
}

#[test]
fn load_of_missing_file_is_anonymous() {
    let tmp = tempdir().expect("tempdir");
    let absent = tmp.path().join("absent.json");
    let keychain = Keychain::load(Some(absent.as_path())).expect("load");
    assert_eq!(keychain.resolve("quay.io").expect("resolve"), Credential::Anonymous);
}

#[test]
fn load_of_malformed_file_is_an_error() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("config.json");
    fs::write(&path, "{ broken").expect("write config");
    assert!(Keychain::load(Some(path.as_path())).is_err());
}
