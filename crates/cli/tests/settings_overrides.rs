use std::fs;

use tempfile::tempdir;
use unbake::commands::RegistryArgs;
use unbake::read_image_config;
use unbake_core::config::DEFAULT_TIMEOUT_SECS;
use unbake_core::model::Platform;

#[test]
fn defaults_without_config_file() {
    let config = RegistryArgs::default().effective_config().expect("config");
    assert_eq!(config.registry.platform, Platform::default());
    assert_eq!(config.registry.timeout_secs, DEFAULT_TIMEOUT_SECS);
}

#[test]
fn flags_override_file_values() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("unbake.json");
    fs::write(
        &path,
        r#"{ "registry": { "timeout_secs": 90, "insecure_registries": ["registry.lan:5000"] } }"#,
    )
    .expect("write config");

    let args = RegistryArgs {
        config: Some(path),
        platform: Some("linux/arm/v7".parse().expect("platform")),
        docker_config: Some(tmp.path().join("docker.json")),
        insecure_registries: vec!["REGISTRY.lan:5000".into(), "other.lan".into()],
        timeout_secs: Some(3),
    };
    let registry = args.effective_config().expect("config").registry;
    assert_eq!(registry.platform.to_string(), "linux/arm/v7");
    assert_eq!(registry.timeout_secs, 3);
    assert_eq!(registry.docker_config, Some(tmp.path().join("docker.json")));
    assert_eq!(registry.insecure_registries, vec!["registry.lan:5000", "other.lan"]);
}

#[test]
fn bad_config_file_is_reported() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("unbake.json");
    fs::write(&path, "[]").expect("write config");
    let args = RegistryArgs { config: Some(path), ..RegistryArgs::default() };
    let err = args.effective_config().unwrap_err();
    assert!(err.to_string().contains("Failed to parse config JSON"), "unexpected error: {err}");
}

#[test]
fn image_config_errors_name_the_file() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("image.json");
    fs::write(&path, "{ not json").expect("write config");
    let err = read_image_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse image config JSON"));
}
