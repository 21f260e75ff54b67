//! Tests for the `sieve` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn sieve(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sieve"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run sieve")
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("greetings.txt"),
        "i love to say hello world to everyone\n\ni hate to say world hello to anyone\nhello hello world world\n",
    )
    .unwrap();
    fs::write(dir.path().join("other.txt"), "nothing to see\nsay hello world again\n").unwrap();
    dir
}

#[test]
fn test_phrase_prints_matching_lines() {
    let dir = fixture();
    let output = sieve(&["phrase", "greetings.txt", "--terms", "hello", "world"], dir.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "greetings.txt:1:i love to say hello world to everyone",
            "greetings.txt:4:hello hello world world",
        ]
    );
}

#[test]
fn test_phrase_json_over_directory() {
    let dir = fixture();
    let output = sieve(
        &["phrase", ".", "--terms", "say hello", "--json", "--segment-size", "1"],
        dir.path(),
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["phrase"], serde_json::json!(["say", "hello"]));
    let matches = json["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0]["line_number"], 1);
    assert_eq!(matches[1]["text"], "say hello world again");
}

#[test]
fn test_phrase_with_filter_words() {
    let dir = fixture();
    let output = sieve(
        &["phrase", ".", "--terms", "hello", "world", "--filter", "again"],
        dir.path(),
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("say hello world again"));
}

#[test]
fn test_stats() {
    let dir = fixture();
    let output = sieve(&["stats", ".", "--segment-size", "2"], dir.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Segments:    3"), "{stdout}");
    assert!(stdout.contains("Documents:   5"), "{stdout}");
}

#[test]
fn test_bad_config_is_reported() {
    let dir = fixture();
    fs::write(dir.path().join("bad.json"), r#"{"segment_size": 0}"#).unwrap();
    let output = sieve(
        &["phrase", "greetings.txt", "--terms", "hello", "--config", "bad.json"],
        dir.path(),
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad.json"));
}

#[test]
fn test_missing_path_fails() {
    let dir = fixture();
    let output = sieve(&["phrase", "missing.txt", "--terms", "hello"], dir.path());
    assert!(!output.status.success());
}
