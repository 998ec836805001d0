use assert_cmd::prelude::*;
#[allow(unused_imports)]
use predicates::prelude::*;

use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn tmp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tiersim-cli-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_cli() {
    let mut cmd = Command::cargo_bin("tiersim").expect("Calling binary failed");
    cmd.assert().failure();
}

#[test]
fn test_version() {
    let expected_version = "tiersim 0.1.0\n";
    let mut cmd = Command::cargo_bin("tiersim").expect("Calling binary failed");
    cmd.arg("--version").assert().stdout(expected_version);
}

#[test]
fn test_subcommand_version() {
    let expected = "argument '--version' which wasn't expected";

    let mut cmd = Command::cargo_bin("tiersim").expect("Calling binary failed");
    cmd.arg("config")
        .arg("--version")
        .assert()
        .stderr(predicate::str::contains(expected));
}

#[test]
fn test_config_dump() {
    let mut cmd = Command::cargo_bin("tiersim").expect("Calling binary failed");
    cmd.arg("config")
        .arg("--preset")
        .arg("sequential")
        .assert()
        .success()
        .stdout(predicate::str::contains("type: sequential"))
        .stdout(predicate::str::contains("straggler_threshold_percent: 20"));
}

#[test]
fn test_generate_then_run() {
    let input = tmp_dir("input");
    let output = tmp_dir("output");

    Command::cargo_bin("tiersim")
        .expect("Calling binary failed")
        .args(&["generate", "--num-files", "10", "--seed", "cli"])
        .arg(&input)
        .assert()
        .success();

    Command::cargo_bin("tiersim")
        .expect("Calling binary failed")
        .arg("run")
        .arg(&input)
        .arg("--output-dir")
        .arg(&output)
        .args(&["--output-name", "cli", "--policy", "sequential"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total execution time"))
        .stdout(predicate::str::contains("Workers: 10"));

    for name in &["cli_workers.csv", "cli_threads.csv", "cli_summary.json", "cli_trace.json"] {
        assert!(output.join(name).exists(), "{} missing", name);
    }

    fs::remove_dir_all(input).unwrap();
    fs::remove_dir_all(output).unwrap();
}

#[test]
fn test_round_robin_needs_a_cap() {
    let input = tmp_dir("nocap");
    Command::cargo_bin("tiersim")
        .expect("Calling binary failed")
        .args(&["generate", "--num-files", "3"])
        .arg(&input)
        .assert()
        .success();

    Command::cargo_bin("tiersim")
        .expect("Calling binary failed")
        .arg("run")
        .arg(&input)
        .args(&["--policy", "round_robin", "--output-dir"])
        .arg(input.join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrent_workers"));

    fs::remove_dir_all(input).unwrap();
}
