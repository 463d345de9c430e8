use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A static config carries structure only; the root container id and API
/// token are injected from the environment.
#[tokio::test]
#[serial]
async fn test_load_config_merges_file_and_env() {
    let config_yaml = r#"
source_dir: ./docs
state_file: ./tmp/state.json
backend:
  base_url: "https://backend.example/api"
exclude:
  - "^drafts/"
retry_limit: 5
upload_concurrency: 2
media_container_name: "assets"
publish_assets: false
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    env::set_var("DOCSYNC_ROOT_CONTAINER_ID", "root-42");
    env::set_var("DOCSYNC_API_TOKEN", "secret-token");

    let config = docsync::load_config::load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.options.source_dir, PathBuf::from("./docs"));
    assert_eq!(config.options.state_file, PathBuf::from("./tmp/state.json"));
    assert_eq!(config.options.root_container_id, "root-42");
    assert_eq!(config.options.exclude, vec!["^drafts/".to_string()]);
    assert_eq!(config.options.retry_limit, 5);
    assert_eq!(config.options.upload_concurrency, 2);
    assert_eq!(config.options.media_container_name, "assets");
    assert!(!config.options.publish_assets);
    assert!(!config.options.dry_run);
    assert_eq!(config.backend.base_url, "https://backend.example/api");
    assert_eq!(config.backend.api_token, "secret-token");
}

/// Optional tuning fields fall back to engine defaults when omitted.
#[tokio::test]
#[serial]
async fn test_load_config_applies_defaults_for_optional_fields() {
    let config_yaml = r#"
source_dir: ./docs
state_file: ./state.json
backend:
  base_url: "https://backend.example/api"
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    env::set_var("DOCSYNC_ROOT_CONTAINER_ID", "root-42");
    env::set_var("DOCSYNC_API_TOKEN", "secret-token");

    let config = docsync::load_config::load_config(config_file.path()).expect("Config should load");

    assert!(config.options.exclude.is_empty());
    assert_eq!(config.options.retry_limit, 3);
    assert_eq!(config.options.upload_concurrency, 4);
    assert_eq!(config.options.media_container_name, "docsync-media");
    assert!(config.options.publish_assets);
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_on_empty_root_container_id() {
    let config_yaml = r#"
source_dir: ./docs
state_file: ./state.json
backend:
  base_url: "https://backend.example/api"
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    env::set_var("DOCSYNC_ROOT_CONTAINER_ID", "   ");
    env::set_var("DOCSYNC_API_TOKEN", "secret-token");

    let err = docsync::load_config::load_config(config_file.path()).unwrap_err();
    assert!(
        err.to_string().contains("DOCSYNC_ROOT_CONTAINER_ID"),
        "Expected empty-id error, got: {err}"
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"not-yaml: [:::").unwrap();

    // Provide env so we don't fail early
    env::set_var("DOCSYNC_ROOT_CONTAINER_ID", "root-42");
    env::set_var("DOCSYNC_API_TOKEN", "invalid-but-present");

    let err = docsync::load_config::load_config(config_file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}
