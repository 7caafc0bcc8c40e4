use cortexluma::config::{AppConfig, DEFAULT_WELCOME_MESSAGE};
use cortexluma::llm::TransportMode;
use serial_test::serial;
use std::env;
use std::fs;

// Clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("CORTEX_SERVER__PORT");
        env::remove_var("CORTEX_CHAT__MODE");
        env::remove_var("CORTEX_CHAT__APPEND_ERROR_MESSAGE");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("HOST");
        env::remove_var("CHAT_MODE");
    }
}

fn load(args: &[&str]) -> AppConfig {
    let mut argv = vec!["cortexluma"];
    argv.extend_from_slice(args);
    AppConfig::load_from_args(argv).expect("Failed to load config")
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = load(&[]);
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.chat.mode, TransportMode::Stream);
    assert_eq!(config.chat.welcome_message, DEFAULT_WELCOME_MESSAGE);
    assert!(config.chat.append_error_message);
    assert!(config.chat.system_instruction().is_some());
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("CORTEX_SERVER__PORT", "9090");
        env::set_var("CORTEX_CHAT__MODE", "whole");
        env::set_var("CORTEX_CHAT__APPEND_ERROR_MESSAGE", "false");
    }

    let config = load(&[]);
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.chat.mode, TransportMode::Whole);
    assert!(!config.chat.append_error_message);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env_vars();
    unsafe {
        env::set_var("CORTEX_SERVER__PORT", "9090");
    }

    let config = load(&["--port", "4040", "--mode", "whole"]);
    assert_eq!(config.server.port, 4040);
    assert_eq!(config.chat.mode, TransportMode::Whole);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = dir.path().join("cortex.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
chat:
  welcome_message: "Hello from the file"
"#,
    )
    .expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = load(&[]);
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.chat.welcome_message, "Hello from the file");
    // Keys missing from the file keep their defaults
    assert_eq!(config.chat.mode, TransportMode::Stream);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["cortexluma", "--config", "/nonexistent/cortex.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "config.yaml";
    fs::write(cwd_path, "server:\n  port: 6060\n").expect("Failed to write ./config.yaml");

    let result = std::panic::catch_unwind(|| {
        let config = load(&[]);
        assert_eq!(config.server.port, 6060);
    });

    fs::remove_file(cwd_path).expect("Failed to remove ./config.yaml");

    if let Err(e) = result {
        std::panic::resume_unwind(e);
    }
}
