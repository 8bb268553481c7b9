use std::io::Write;
use std::time::Duration;

use mcp_stdio::config::{ClientConfig, ServerConfig, DEFAULT_TIMEOUT_MS};
use mcp_stdio::AppError;

fn sample_toml() -> &'static str {
    r#"
default_timeout_ms = 15000

[servers.filesystem]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "."]
env = { LOG_LEVEL = "warn" }

[servers.search]
command = "search-server"
timeout_ms = 2500
"#
}

#[test]
fn parses_servers_and_defaults() {
    let config = ClientConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.default_timeout_ms, 15_000);
    assert_eq!(config.servers.len(), 2);

    let fs = &config.servers["filesystem"];
    assert_eq!(fs.command, "npx");
    assert_eq!(fs.args.len(), 3);
    assert_eq!(fs.env.get("LOG_LEVEL").map(String::as_str), Some("warn"));
    assert_eq!(fs.timeout_ms, None);
}

#[test]
fn resolved_servers_fill_missing_timeouts() {
    let config = ClientConfig::from_toml_str(sample_toml()).expect("valid config");
    let servers = config.resolved_servers();

    assert_eq!(servers["filesystem"].timeout(), Duration::from_millis(15_000));
    assert_eq!(servers["search"].timeout(), Duration::from_millis(2_500));
}

#[test]
fn empty_file_uses_default_timeout() {
    let config = ClientConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config.default_timeout_ms, DEFAULT_TIMEOUT_MS);
    assert!(config.servers.is_empty());
}

#[test]
fn server_timeout_defaults_to_thirty_seconds() {
    assert_eq!(ServerConfig::new("x").timeout(), Duration::from_secs(30));
}

#[test]
fn builder_sets_args_env_and_timeout() {
    let config = ServerConfig::new("sh")
        .with_args(["-c", "cat"])
        .with_env("MODE", "test")
        .with_timeout(Duration::from_millis(250));

    assert_eq!(config.args, vec!["-c".to_owned(), "cat".to_owned()]);
    assert_eq!(config.env.get("MODE").map(String::as_str), Some("test"));
    assert_eq!(config.timeout(), Duration::from_millis(250));
}

#[test]
fn empty_command_is_rejected() {
    let err = ClientConfig::from_toml_str("[servers.bad]\ncommand = \"  \"\n")
        .expect_err("blank command must fail");
    match err {
        AppError::Config(msg) => assert!(msg.contains("bad"), "error must name the server: {msg}"),
        other => panic!("expected AppError::Config, got: {other:?}"),
    }
}

#[test]
fn zero_timeouts_are_rejected() {
    assert!(matches!(
        ClientConfig::from_toml_str("default_timeout_ms = 0\n"),
        Err(AppError::Config(_))
    ));
    assert!(matches!(
        ClientConfig::from_toml_str("[servers.a]\ncommand = \"a\"\ntimeout_ms = 0\n"),
        Err(AppError::Config(_))
    ));
}

#[test]
fn missing_command_is_a_parse_error() {
    let err = ClientConfig::from_toml_str("[servers.a]\nargs = []\n").expect_err("must fail");
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write config");

    let config = ClientConfig::load_from_path(file.path()).expect("load config");
    assert_eq!(config.servers.len(), 2);
}

#[test]
fn load_from_missing_path_fails() {
    let err = ClientConfig::load_from_path("/definitely/not/here/servers.toml")
        .expect_err("missing file must fail");
    assert!(matches!(err, AppError::Config(_)));
}
