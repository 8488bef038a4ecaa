#![allow(deprecated)] // cargo_bin

use assert_cmd::Command;
use predicates::prelude::*;

fn provider() -> Command {
    Command::cargo_bin("cherry-provider").unwrap()
}

#[test]
fn test_cli_help() {
    provider()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cherry Servers resource provider"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_cli_version() {
    provider()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cherry-provider"));
}

#[test]
fn test_schema_needs_no_token() {
    provider()
        .arg("schema")
        .env_remove("CHERRY_AUTH_TOKEN")
        .assert()
        .success()
        .stdout(predicate::str::contains("cherry-servers:index:Project"))
        .stdout(predicate::str::contains("local_asn"));
}

#[test]
fn test_check_valid_inputs() {
    provider()
        .args(["check", r#"{"name": "myProject", "team": 148226, "bgp": true}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"team\": 148226"))
        .stdout(predicate::str::contains("\"bgp\": true"));
}

#[test]
fn test_check_generates_name() {
    provider()
        .args(["check", "--name", "web", r#"{"team": 1}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"web-"));
}

#[test]
fn test_check_rejects_missing_team() {
    provider()
        .args(["check", r#"{"name": "myProject"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("team: missing required property"));
}

#[test]
fn test_serve_help() {
    provider()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--replace-policy"))
        .stdout(predicate::str::contains("--log-file"));
}

#[test]
fn test_serve_without_token_fails() {
    let log = tempfile::NamedTempFile::new().unwrap();
    provider()
        .arg("serve")
        .arg("--log-file")
        .arg(log.path())
        .env_remove("CHERRY_AUTH_TOKEN")
        .env_remove("CHERRY_API_URL")
        .env_remove("CHERRY_REPLACE_POLICY")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CHERRY_AUTH_TOKEN"));
}

#[test]
fn test_serve_rejects_unknown_replace_policy() {
    provider()
        .args(["serve", "--token", "t", "--replace-policy", "sideways"])
        .env("CHERRY_PROVIDER_LOG", std::env::temp_dir().join("cherry-provider-test.log"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown replace policy"));
}
