use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use soma_ingest::config::{Config, ConfigLoader, default_alt_name};
use soma_ingest::error::SomaError;
use soma_ingest::ingest::FrameOptions;

#[test]
fn load_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("soma-ingest.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "storage_root": "/data/soma",
            "platform_config": {"capacity": 100000},
            "index_prefix": "scanpy"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.storage_root, Utf8PathBuf::from("/data/soma"));
    assert_eq!(
        resolved.platform_config.get("capacity"),
        Some(&serde_json::json!(100000))
    );

    let options = FrameOptions::from_config(&resolved);
    assert_eq!(options.alt_name, default_alt_name());
    assert_eq!(options.prefix, "scanpy");
    assert_eq!(options.index_column_names, vec!["soma_joinid"]);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, SomaError::ConfigRead(_));
}

#[test]
fn malformed_config_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("soma-ingest.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(SomaError::ConfigParse(_))
    );
}

#[test]
fn empty_storage_root_rejected() {
    let config = Config {
        storage_root: Some("  ".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(SomaError::Configuration(_))
    );
}

#[test]
fn unknown_schema_version_rejected() {
    let config = Config {
        schema_version: Some(7),
        storage_root: Some("/data".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(SomaError::ConfigParse(_))
    );
}
