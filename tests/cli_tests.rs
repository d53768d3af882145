use assert_cmd::Command;
use predicates::prelude::*;

/// The binary with no inherited credentials and no `.env` in reach
fn relaybot() -> Command {
    let mut cmd = Command::cargo_bin("relaybot").unwrap();
    cmd.env_clear().current_dir(std::env::temp_dir());
    cmd
}

#[test]
fn test_missing_credentials_is_usage_error() {
    relaybot()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("TELEGRAM_BOT_API_KEY"));
}

#[test]
fn test_missing_gemini_key_is_usage_error() {
    relaybot()
        .arg("123456:token")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GOOGLE_GEMINI_KEY"));
}

#[test]
fn test_token_from_environment() {
    relaybot()
        .env("TELEGRAM_BOT_API_KEY", "123456:token")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GOOGLE_GEMINI_KEY"));
}

#[test]
fn test_invalid_number_is_usage_error() {
    relaybot()
        .args(["123456:token", "gemini-key"])
        .env("RPM_LIMIT", "lots")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("RPM_LIMIT"));
}

#[test]
fn test_help_lists_arguments() {
    relaybot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("TG_TOKEN"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_flag() {
    relaybot()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_flag_exits_with_usage_code() {
    relaybot().arg("--bogus").assert().code(2);
}
