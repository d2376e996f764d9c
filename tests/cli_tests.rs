//! CLI wiring tests
//!
//! Settings come from temp config files; the server is exercised through
//! the router without binding a socket.

use std::io::Write;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use clap::Parser;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use codeatease::cli::{self, Args, Error, LogFormat, EXIT_CONFIG_ERROR};
use codeatease::load_settings;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn args_for(file: &NamedTempFile, extra: &[&str]) -> Args {
    let path = file.path().to_string_lossy().to_string();
    let mut argv = vec!["codeatease", "--config", path.as_str()];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
}

#[test]
fn test_parse_defaults() {
    let args = Args::try_parse_from(["codeatease"]).unwrap();
    assert_eq!(args.config, None);
    assert_eq!(args.port, None);
    assert_eq!(args.log_format, LogFormat::Pretty);
    assert!(!args.check_config);

    let args = Args::try_parse_from(["codeatease", "--log-format", "json", "-p", "9000"]).unwrap();
    assert_eq!(args.log_format, LogFormat::Json);
    assert_eq!(args.port, Some(9000));

    assert!(Args::try_parse_from(["codeatease", "--log-format", "xml"]).is_err());
}

#[test]
fn test_flags_override_file() {
    let file = config_file(
        r#"
[server]
host = "127.0.0.1"
port = 8100

[session]
secret = "file-secret"
"#,
    );

    let settings = load_settings(&args_for(&file, &[])).unwrap();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8100);

    let settings = load_settings(&args_for(&file, &["--port", "9100", "--host", "0.0.0.0"])).unwrap();
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 9100);
}

#[test]
fn test_invalid_settings_map_to_config_exit_code() {
    let file = config_file("[session]\nttl_minutes = 0\n");
    let err = load_settings(&args_for(&file, &[])).unwrap_err();
    assert!(matches!(err, Error::Settings(_)));
    assert_eq!(err.exit_code(), EXIT_CONFIG_ERROR);
}

#[test]
fn test_model_only_with_token() {
    let file = config_file("[session]\nsecret = \"s\"\n");
    let mut settings = load_settings(&args_for(&file, &[])).unwrap();
    settings.llm.api_token = None;
    assert!(cli::language_model(&settings).unwrap().is_none());
    assert!(cli::summary(&settings).contains("fallback only"));

    settings.llm.api_token = Some("hf_test".to_string());
    assert!(cli::language_model(&settings).unwrap().is_some());
    assert!(!cli::summary(&settings).contains("hf_test"));
}

#[tokio::test]
async fn test_wired_state_serves_health() {
    let file = config_file(
        r#"
[server]
base_url = "https://code.example.com"

[session]
secret = "wired"
"#,
    );
    let mut settings = load_settings(&args_for(&file, &[])).unwrap();
    settings.llm.api_token = None;

    let state = cli::build_state(&settings).unwrap();
    assert_eq!(state.config.base_url, "https://code.example.com");
    let app = codeatease_api::router(Arc::new(state));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ai_available"], false);

    let response = app
        .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["baseUrl"], "https://code.example.com");
    assert_eq!(json["environment"], "production");
}
