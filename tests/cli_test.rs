//! Process-level tests for the `cloudsql-agent` binary.
//!
//! These run the built executable with a scrubbed environment and check the
//! exit status and what reaches stdout.

use std::io::Write;
use std::process::{Command, Output, Stdio};

const ENV_VARS: &[&str] = &[
    "DB_INSTANCE_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_NAME",
    "DB_IP_TYPE",
    "DB_HOST",
    "CLOUDSQL_ACCESS_TOKEN",
    "GOOGLE_API_KEY",
    "AGENT_SESSION_ID",
    "AGENT_ENABLE_LOGS",
    "RUST_LOG",
];

/// Run the agent in an empty directory (so no `.env` is picked up) with `stdin` piped in.
fn run_agent(args: &[&str], stdin: &str) -> Output {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cloudsql-agent"));
    cmd.args(args)
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }

    let mut child = cmd.spawn().unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_missing_credentials_exits_with_error() {
    let output = run_agent(&["--api-key", "key"], "");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(
        stdout.starts_with("Error: Configuration error: DB credentials missing"),
        "{stdout}"
    );
    assert!(!stdout.contains("Connected to:"));
}

#[test]
fn test_missing_password_exits_with_error() {
    let output = run_agent(&["--instance", "p:r:i", "--api-key", "key"], "");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("DB credentials missing"), "{stdout}");
}

#[test]
fn test_exit_keyword_ends_cleanly() {
    let output = run_agent(
        &[
            "--instance",
            "p:r:i",
            "--password",
            "pw",
            "--api-key",
            "key",
            "--db-host",
            "127.0.0.1:1",
        ],
        "exit\n",
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stdout,
        "Connected to: p:r:i\nType 'exit' or 'quit' to leave.\n"
    );
}
