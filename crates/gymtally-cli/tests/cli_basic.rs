//! Basic CLI E2E tests.
//!
//! Tests invoke the compiled binary with HOME pointed at a throwaway
//! directory, so each test run gets its own database and config.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run the CLI against an isolated home directory and return output.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_gymtally"))
        .env("HOME", home)
        .env("GYMTALLY_ENV", "dev")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\nstderr: {stderr}");
    stdout
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).expect("Failed to parse JSON output")
}

fn add_gym(home: &Path, min_stay: &str) {
    run_cli_success(
        home,
        &[
            "gym", "add", "gym-1", "--name", "Iron Temple", "--lat", "-34.6037", "--lon",
            "-58.3816", "--min-stay", min_stay,
        ],
    );
}

#[test]
fn test_gym_add_and_list() {
    let home = TempDir::new().unwrap();
    add_gym(home.path(), "20");

    let stdout = run_cli_success(home.path(), &["gym", "list"]);
    let gyms = parse_json(&stdout);
    assert_eq!(gyms.as_array().unwrap().len(), 1);
    assert_eq!(gyms[0]["name"], "Iron Temple");
    // Radius fell back to the configured default.
    assert_eq!(gyms[0]["radius_m"], 180.0);

    let stdout = run_cli_success(home.path(), &["gym", "show", "gym-1"]);
    assert_eq!(parse_json(&stdout)["id"], "gym-1");
}

#[test]
fn test_gym_show_unknown_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["gym", "show", "nowhere"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown gym"));
}

#[test]
fn test_ping_outside_geofence() {
    let home = TempDir::new().unwrap();
    add_gym(home.path(), "20");

    let stdout = run_cli_success(
        home.path(),
        &[
            "checkin", "ping", "member-1", "gym-1", "--lat", "-34.59", "--lon", "-58.3816",
        ],
    );
    let update = parse_json(&stdout);
    assert_eq!(update["geofence_status"], "outside");
    assert!(update["presence"].is_null());
}

#[test]
fn test_zero_stay_gym_confirms_on_second_ping() {
    let home = TempDir::new().unwrap();
    add_gym(home.path(), "0");
    let inside = &[
        "checkin", "ping", "member-1", "gym-1", "--lat", "-34.6037", "--lon", "-58.3816",
    ];

    let first = parse_json(&run_cli_success(home.path(), inside));
    assert_eq!(first["geofence_status"], "entered");

    let second = parse_json(&run_cli_success(home.path(), inside));
    assert_eq!(second["geofence_status"], "stay_satisfied");
    assert!(!second["assistance"].is_null());

    let balance = parse_json(&run_cli_success(
        home.path(),
        &["ledger", "balance", "member-1"],
    ));
    assert_eq!(balance["balance"], 10);
}

#[test]
fn test_manual_checkin_awards_once_per_day() {
    let home = TempDir::new().unwrap();
    add_gym(home.path(), "20");

    run_cli_success(home.path(), &["checkin", "manual", "member-1", "gym-1"]);
    run_cli_success(home.path(), &["checkin", "manual", "member-1", "gym-1"]);

    let entries = parse_json(&run_cli_success(
        home.path(),
        &["ledger", "list", "member-1"],
    ));
    let attendance: Vec<_> = entries
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["reason"] == "ATTENDANCE")
        .collect();
    assert_eq!(attendance.len(), 1);

    let summary = parse_json(&run_cli_success(
        home.path(),
        &["progress", "summary", "member-1"],
    ));
    assert_eq!(summary["balance"], 10);
    assert_eq!(summary["streak"]["value"], 1);
    assert_eq!(summary["weekly"]["assist_count"], 1);
}

#[test]
fn test_multiplier_scales_manual_checkin() {
    let home = TempDir::new().unwrap();
    add_gym(home.path(), "20");

    run_cli_success(home.path(), &["multiplier", "activate", "member-1", "2.0"]);
    run_cli_success(home.path(), &["checkin", "manual", "member-1", "gym-1"]);

    let balance = parse_json(&run_cli_success(
        home.path(),
        &["ledger", "balance", "member-1"],
    ));
    assert_eq!(balance["balance"], 20);
}

#[test]
fn test_ledger_award_and_invalid_reason() {
    let home = TempDir::new().unwrap();

    run_cli_success(
        home.path(),
        &[
            "ledger", "award", "member-1", "ROUTINE_COMPLETE", "15", "--ref", "routine-1",
        ],
    );
    // Replaying the same reference appends nothing new.
    run_cli_success(
        home.path(),
        &[
            "ledger", "award", "member-1", "ROUTINE_COMPLETE", "15", "--ref", "routine-1",
        ],
    );
    let balance = parse_json(&run_cli_success(
        home.path(),
        &["ledger", "balance", "member-1"],
    ));
    assert_eq!(balance["balance"], 15);

    let (_, stderr, code) = run_cli(
        home.path(),
        &["ledger", "award", "member-1", "GIFT", "5", "--ref", "x"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("Invalid ledger reason"));
}

#[test]
fn test_member_goal_and_recovery_grant() {
    let home = TempDir::new().unwrap();

    run_cli_success(home.path(), &["member", "set-goal", "member-1", "5"]);
    let weekly = parse_json(&run_cli_success(
        home.path(),
        &["progress", "weekly", "member-1"],
    ));
    assert_eq!(weekly["goal"], 5);

    let streak = parse_json(&run_cli_success(
        home.path(),
        &["member", "grant-recovery", "member-1", "2"],
    ));
    assert_eq!(streak["recovery_items"], 2);
}

#[test]
fn test_config_get_set_roundtrip() {
    let home = TempDir::new().unwrap();

    let value = run_cli_success(home.path(), &["config", "get", "rewards.attendance_tokens"]);
    assert_eq!(value.trim(), "10");

    run_cli_success(
        home.path(),
        &["config", "set", "rewards.attendance_tokens", "25"],
    );
    let value = run_cli_success(home.path(), &["config", "get", "rewards.attendance_tokens"]);
    assert_eq!(value.trim(), "25");

    run_cli_success(home.path(), &["config", "reset"]);
    let value = run_cli_success(home.path(), &["config", "get", "rewards.attendance_tokens"]);
    assert_eq!(value.trim(), "10");

    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "rewards.bogus"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}
