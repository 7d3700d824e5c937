use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 13] = [
    "AIGERNON_WORKSPACE",
    "AIGERNON_TOOLS_TIMEOUT",
    "AIGERNON_TOOLS_WORKING_DIR",
    "AIGERNON_TOOLS_RESTRICT_TO_WORKSPACE",
    "AIGERNON_TOOLS_USE_ALLOWLIST",
    "AIGERNON_TOOLS_ALLOW_PREFIXES",
    "AIGERNON_AUDIT_ENABLED",
    "AIGERNON_AUDIT_DIR",
    "AIGERNON_SANITIZER_ENABLED",
    "AIGERNON_SANITIZER_STRICT",
    "AIGERNON_RATE_LIMIT_ENABLED",
    "AIGERNON_RATE_LIMIT_MAX_REQUESTS",
    "AIGERNON_RATE_LIMIT_WINDOW_SECONDS",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.agent.name, "Aigernon");
    assert!(config.agent.workspace.is_none());
    assert_eq!(config.tools.shell.timeout, 60);
    assert!(config.tools.shell.use_allowlist);
    assert!(!config.tools.shell.restrict_to_workspace);
    assert!(config.tools.audit.enabled);
    assert!(config.tools.sanitizer.enabled);
    assert!(!config.tools.sanitizer.strict);
    assert_eq!(config.security.rate_limit.max_requests, 30);
    assert_eq!(config.security.rate_limit.window_seconds, 60);
    assert_eq!(config.security.rate_limit.burst_limit, 5);
    assert_eq!(config.security.rate_limit.burst_window_seconds, 5);
    assert!(config.channels.entries.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.agent.name, "Aigernon");
    assert_eq!(config.tools.shell.timeout, 60);
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[agent]
name = "TestBot"
workspace = "/srv/aigernon"

[tools.shell]
timeout = 15
restrict_to_workspace = true
deny_patterns = ["\\bnpm\\s+publish\\b"]

[tools.audit]
dir = "/var/log/aigernon"

[tools.sanitizer]
strict = true

[security.rate_limit]
max_requests = 10
burst_limit = 2

[security.integrity]
auto_alert = false

[channels.telegram]
allow_from = ["123456|alice", "bob"]

[channels.slack]
"#
    )
    .unwrap();

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.agent.name, "TestBot");
    assert_eq!(
        config.agent.resolved_workspace(),
        PathBuf::from("/srv/aigernon")
    );
    assert_eq!(config.tools.shell.timeout, 15);
    assert!(config.tools.shell.restrict_to_workspace);
    assert_eq!(config.tools.shell.deny_patterns.len(), 1);
    assert_eq!(
        config.tools.audit.resolved_dir(),
        PathBuf::from("/var/log/aigernon")
    );
    assert!(config.tools.sanitizer.strict);
    assert_eq!(config.security.rate_limit.max_requests, 10);
    assert_eq!(config.security.rate_limit.burst_limit, 2);
    assert_eq!(config.security.rate_limit.window_seconds, 60);
    assert!(!config.security.integrity.auto_alert);

    let allowlists = config.channels.allowlists();
    assert_eq!(
        allowlists["telegram"],
        vec!["123456|alice".to_owned(), "bob".to_owned()]
    );
    assert!(allowlists["slack"].is_empty());
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[tools.shell\ntimeout = ").unwrap();

    clear_env();

    let err = Config::load(&path).unwrap_err();
    assert_eq!(err.to_string(), "failed to parse config file");
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    let mut config = Config::default();

    unsafe {
        std::env::set_var("AIGERNON_TOOLS_TIMEOUT", "5");
        std::env::set_var("AIGERNON_TOOLS_ALLOW_PREFIXES", "git , ls ,, cargo ");
        std::env::set_var("AIGERNON_SANITIZER_STRICT", "true");
        std::env::set_var("AIGERNON_RATE_LIMIT_MAX_REQUESTS", "3");
        std::env::set_var("AIGERNON_WORKSPACE", "/tmp/ws");
    };
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.tools.shell.timeout, 5);
    assert_eq!(
        config.tools.shell.allow_prefixes,
        Some(vec!["git".to_owned(), "ls".to_owned(), "cargo".to_owned()])
    );
    assert!(config.tools.sanitizer.strict);
    assert_eq!(config.security.rate_limit.max_requests, 3);
    assert_eq!(config.agent.workspace, Some(PathBuf::from("/tmp/ws")));
}

#[test]
#[serial]
fn unparsable_env_values_are_ignored() {
    clear_env();
    let mut config = Config::default();

    unsafe {
        std::env::set_var("AIGERNON_TOOLS_TIMEOUT", "soon");
        std::env::set_var("AIGERNON_AUDIT_ENABLED", "maybe");
    };
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.tools.shell.timeout, 60);
    assert!(config.tools.audit.enabled);
}

#[test]
fn validate_rejects_zero_limits() {
    let mut config = Config::default();
    config.tools.shell.timeout = 0;
    assert_eq!(
        config.validate().unwrap_err().to_string(),
        "tools.shell.timeout must be greater than zero"
    );

    let mut config = Config::default();
    config.security.rate_limit.burst_limit = 0;
    assert_eq!(
        config.validate().unwrap_err().to_string(),
        "security.rate_limit.burst_limit must be greater than zero"
    );
}
