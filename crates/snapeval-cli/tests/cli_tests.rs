/// Integration tests for the snapeval binary

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

const FIXTURE: &str = r#"{
    "classes": [{
        "name": "geo.Point",
        "fields": [{ "name": "x", "type": "int" }, { "name": "y", "type": "int" }]
    }],
    "objects": [{ "id": "p", "class": "geo.Point", "fields": { "x": 3, "y": 4 } }],
    "frame": {
        "declaring_type": "geo.Point",
        "this": "p",
        "locals": [{ "name": "name", "type": "java.lang.String", "value": "ada" }]
    }
}"#;

fn fixture_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create fixture file");
    file.write_all(FIXTURE.as_bytes()).expect("write fixture");
    file
}

fn snapeval(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snapeval"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run snapeval")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn test_evaluates_in_fixture_frame() {
    let file = fixture_file();
    let path = file.path().to_str().unwrap();
    let output = snapeval(&["--fixture", path, "x * x + y * y"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout(&output), "25");

    let output = snapeval(&["--fixture", path, "name.toUpperCase() + '!'"]);
    assert_eq!(stdout(&output), "\"ADA!\"");
}

#[test]
fn test_object_context_has_no_locals() {
    let file = fixture_file();
    let path = file.path().to_str().unwrap();
    let output = snapeval(&["--fixture", path, "--object", "x + y"]);
    assert_eq!(stdout(&output), "7");

    let output = snapeval(&["--fixture", path, "--object", "name"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn test_faults_exit_with_failure() {
    let output = snapeval(&["1 / 0"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("/ by zero"));
}

#[test]
fn test_step_limit_flag() {
    let output = snapeval(&["--step-limit", "100", "int i = 0; while (true) { i++; }"]);
    assert_eq!(output.status.code(), Some(1));

    let output = snapeval(&["--step-limit", "0", "int i = 0; while (i < 1000) { i++; } return i;"]);
    assert_eq!(stdout(&output), "1000");
}

#[test]
fn test_config_file() {
    let mut config = NamedTempFile::new().expect("create config file");
    config
        .write_all(br#"{ "timeout_ms": 500, "step_limit": 10 }"#)
        .expect("write config");
    let output = snapeval(&["--config", config.path().to_str().unwrap(), "int i = 0; while (true) { i++; }"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("10"));
}
