#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::Command;

fn temp_file(tag: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "alcli-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, content).expect("temp file should be writable");
    path
}

#[test]
fn profile_check_prints_parsed_profile() {
    let path = temp_file("profile-ok", r#"{ "max_frame_size": 4096, "max_connections": 2 }"#);
    let output = Command::new(env!("CARGO_BIN_EXE_agentlink"))
        .args(["--format", "json", "profile", "check"])
        .arg(&path)
        .args(["--name", "lab"])
        .output()
        .expect("profile check should run");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    let profile: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("profile should be json");
    assert_eq!(profile["name"], "lab");
    assert_eq!(profile["config"]["max_frame_size"], 4096);
    assert_eq!(profile["config"]["max_connections"], 2);
}

#[test]
fn profile_check_rejects_malformed_file_with_60() {
    let path = temp_file("profile-bad", r#"{ "max_frame_size": "#);
    let output = Command::new(env!("CARGO_BIN_EXE_agentlink"))
        .args(["profile", "check"])
        .arg(&path)
        .output()
        .expect("profile check should run");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("profile-bad"), "stderr: {stderr}");
}

#[test]
fn send_to_unknown_scheme_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_agentlink"))
        .args(["send", "smb://host/share", "--data", "x"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_to_closed_port_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("port should bind");
        listener.local_addr().expect("bound port").port()
    };
    let output = Command::new(env!("CARGO_BIN_EXE_agentlink"))
        .args(["send", &format!("tcp://127.0.0.1:{port}"), "--timeout", "1s"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_agentlink"))
        .args(["--format", "json", "version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let info: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version should emit json");
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["name"], "agentlink");
}
