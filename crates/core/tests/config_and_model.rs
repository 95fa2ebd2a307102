use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use unbake_core::config::{
    load_config, load_config_or_default, DecompilerConfig, RegistrySettings, DEFAULT_TIMEOUT_SECS,
};
use unbake_core::model::{Descriptor, ImageConfig, ImageIndex, Platform};

#[test]
fn defaults_target_linux_amd64() {
    let settings = RegistrySettings::default();
    assert_eq!(settings.platform, Platform::new("linux", "amd64"));
    assert_eq!(settings.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert!(settings.insecure_registries.is_empty());
    assert!(settings.user_agent.starts_with("unbake/"));
    assert_eq!(load_config_or_default(None).expect("default"), DecompilerConfig::default());
}

#[test]
fn request_timeout_treats_zero_as_unbounded() {
    let settings = RegistrySettings::default();
    assert_eq!(settings.request_timeout(), Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
    let settings = RegistrySettings { timeout_secs: 0, ..settings };
    assert_eq!(settings.request_timeout(), None);
}

#[test]
fn partial_config_file_fills_in_defaults() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("unbake.json");
    fs::write(
        &path,
        r#"{ "registry": {
              "platform": { "os": "linux", "architecture": "arm64", "variant": "v8" },
              "insecure_registries": ["Registry.Local:5000"]
           } }"#,
    )
    .expect("write config");

    let config = load_config(&path).expect("load");
    assert_eq!(config.config_version, "0.1.0");
    assert_eq!(config.registry.platform.to_string(), "linux/arm64/v8");
    assert_eq!(config.registry.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert!(config.registry.is_insecure("registry.local:5000"));
    assert!(!config.registry.is_insecure("registry.local"));
}

#[test]
fn config_errors_name_the_file() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("missing.json");
    let err = load_config(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config at"));

    let broken = tmp.path().join("broken.json");
    fs::write(&broken, "{ nope").expect("write config");
    let err = load_config(&broken).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config JSON at"));
}

#[test]
fn platform_strings() {
    let platform: Platform = "linux/arm/v7".parse().expect("parse");
    assert_eq!(platform.variant.as_deref(), Some("v7"));
    assert_eq!(platform.to_string(), "linux/arm/v7");
    assert_eq!("windows/amd64".parse::<Platform>().expect("parse"), Platform::new("windows", "amd64"));
    for bad in ["linux", "linux/", "/amd64", "a/b/c/d"] {
        assert!(bad.parse::<Platform>().is_err(), "{bad:?}");
    }
}

fn descriptor(digest: &str, platform: &str) -> Descriptor {
    Descriptor {
        media_type: "application/vnd.oci.image.manifest.v1+json".into(),
        digest: digest.into(),
        size: 0,
        platform: Some(platform.parse().expect("platform")),
    }
}

#[test]
fn index_selection_prefers_exact_variant() {
    let index = ImageIndex {
        media_type: None,
        manifests: vec![
            descriptor("sha256:amd64", "linux/amd64"),
            descriptor("sha256:armv6", "linux/arm/v6"),
            descriptor("sha256:armv7", "linux/arm/v7"),
        ],
    };
    let pick = |p: &str| index.select(&p.parse().expect("platform")).map(|d| d.digest.clone());
    assert_eq!(pick("linux/amd64").as_deref(), Some("sha256:amd64"));
    assert_eq!(pick("linux/arm/v7").as_deref(), Some("sha256:armv7"));
    assert_eq!(pick("linux/arm").as_deref(), Some("sha256:armv6"));
    assert_eq!(pick("linux/arm/v5"), None);
    assert_eq!(pick("linux/s390x"), None);
}

#[test]
fn image_config_reads_docker_json() {
    let config: ImageConfig = serde_json::from_str(
        r#"{
          "architecture": "arm64",
          "os": "linux",
          "config": { "User": "postgres", "Env": ["PATH=/usr/bin"] },
          "rootfs": { "type": "layers", "diff_ids": [] },
          "history": [
            { "created": "2023-11-21T05:21:24.536066751Z", "created_by": "/bin/sh -c #(nop)  CMD [\"postgres\"]", "empty_layer": true },
            { "created_by": "RUN make", "author": "someone" }
          ]
        }"#,
    )
    .expect("parse config");
    assert_eq!(config.runtime_user(), "postgres");
    assert_eq!(config.history.len(), 2);
    assert!(config.history[0].empty_layer);
    assert!(config.history[0].created.is_some());
    assert!(config.history[1].created.is_none());
    assert_eq!(ImageConfig::default().runtime_user(), "");
}
