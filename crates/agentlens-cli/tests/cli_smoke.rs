use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// `agentlens` run with an isolated home and project directory
fn agentlens(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("agentlens").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("AGENTLENS_SERVER_URL")
        .env_remove("AGENTLENS_API_KEY")
        .env_remove("AGENTLENS_AGENT_ID")
        .env_remove("AGENTLENS_REDACT")
        .env_remove("AGENTLENS_DISABLED")
        .env_remove("DO_NOT_TRACK");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    agentlens(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("log-call"));
}

#[test]
fn test_config_shows_defaults() {
    let dir = TempDir::new().unwrap();
    agentlens(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("http://localhost:3400"))
        .stdout(predicate::str::contains("not set"));
}

#[test]
fn test_config_masks_api_key() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".agentlens")).unwrap();
    fs::write(
        dir.path().join(".agentlens/config.toml"),
        r#"
[agentlens]
server_url = "http://collector.internal:9000"
api_key = "sk-live-secret-7f3a"
agent_id = "checkout-bot"
"#,
    )
    .unwrap();

    agentlens(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("http://collector.internal:9000"))
        .stdout(predicate::str::contains("checkout-bot"))
        .stdout(predicate::str::contains("****7f3a"))
        .stdout(predicate::str::contains("sk-live-secret").not());
}

#[test]
fn test_env_overrides_project_config() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".agentlens")).unwrap();
    fs::write(
        dir.path().join(".agentlens/config.toml"),
        "[agentlens]\nagent_id = \"from-file\"\n",
    )
    .unwrap();

    agentlens(&dir)
        .env("AGENTLENS_AGENT_ID", "from-env")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("from-env"))
        .stdout(predicate::str::contains("from-file").not());
}

#[test]
fn test_log_call_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    agentlens(&dir)
        .args(["log-call", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_log_call_rejects_invalid_record() {
    let dir = TempDir::new().unwrap();
    let record = serde_json::json!({"provider": "openai"});
    fs::write(dir.path().join("call.json"), record.to_string()).unwrap();

    agentlens(&dir)
        .args(["log-call", "call.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse LLM call record"));
}

#[test]
fn test_health_unreachable_server_fails() {
    let dir = TempDir::new().unwrap();
    agentlens(&dir)
        .args(["health", "--server-url", "http://127.0.0.1:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not reachable"));
}
