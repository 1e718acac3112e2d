use assert_cmd::Command;
use predicates::prelude::*;

fn relay() -> Command {
    let mut cmd = Command::cargo_bin("voice-relay").unwrap();
    cmd.env_clear();
    cmd
}

#[test]
fn config_schema_prints_json() {
    let output = relay().args(["config", "schema"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let schema: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(schema["title"], "Voice Relay Configuration");
}

#[test]
fn status_redacts_secrets() {
    relay()
        .arg("status")
        .env("GROQ_API_KEY", "gsk_do-not-print-me")
        .env("ADMIN_CODE", "admin123")
        .assert()
        .success()
        .stdout(predicate::str::contains("voice-relay status: OK"))
        .stdout(predicate::str::contains("api_key: gsk_***"))
        .stdout(predicate::str::contains("admin_code: (set)"))
        .stdout(predicate::str::contains("do-not-print-me").not())
        .stdout(predicate::str::contains("admin123").not());
}

#[test]
fn status_rejects_malformed_environment() {
    relay()
        .arg("status")
        .env("RELAY_MAX_ATTEMPTS", "many")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RELAY_MAX_ATTEMPTS"));
}
