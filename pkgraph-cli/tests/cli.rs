use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const DOC_TEMPLATE: &str = r#"{
  "package": {
    "name": "NAME",
    "time": "2020-01-01T00:00:00+00:00",
    "maintainers": [{"name": "jane"}],
    "downloads": {"total": 10, "monthly": 1, "daily": 0},
    "versions": {
      "1.0.0": {
        "version": "1.0.0",
        "version_normalized": "1.0.0.0",
        "license": ["MIT"],
        "authors": [],
        "time": "2021-01-01T00:00:00+00:00",
        "require": REQUIRE
      }
    }
  }
}"#;

/// Write a library dataset and a SQLite config into `root`.
fn dataset(root: &Path, packages: &[(&str, Option<&str>)]) -> PathBuf {
    let names: Vec<&str> = packages.iter().map(|(name, _)| *name).collect();
    let list = serde_json::json!({ "packageNames": names });
    std::fs::write(root.join("library.json"), list.to_string()).unwrap();

    for (name, require) in packages {
        let Some(require) = require else { continue };
        let (vendor, package) = name.split_once('/').unwrap();
        let dir = root.join("packages").join(vendor);
        std::fs::create_dir_all(&dir).unwrap();
        let doc = DOC_TEMPLATE
            .replace("NAME", name)
            .replace("REQUIRE", require);
        std::fs::write(dir.join(format!("{package}.json")), doc).unwrap();
    }

    let config = root.join("pkgraph.toml");
    std::fs::write(
        &config,
        format!(
            "[dataset]\nroot = {:?}\n\n[store]\nbackend = \"sqlite\"\n\n[sqlite]\npath = {:?}\n",
            root.display().to_string(),
            root.join("graph.db").display().to_string(),
        ),
    )
    .unwrap();
    config
}

fn pkgraph(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pkgraph").unwrap();
    cmd.arg("--config").arg(config).arg("-q");
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("pkgraph")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("map"))
        .stdout(predicate::str::contains("reset"));
}

#[test]
fn reset_requires_confirmation() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(tmp.path(), &[]);

    pkgraph(&config)
        .arg("reset")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn unknown_category_is_a_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(tmp.path(), &[]);

    pkgraph(&config)
        .args(["map", "--add-info", "--category", "wordpress-plugin"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown category"));
}

#[test]
fn map_needs_a_phase() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(tmp.path(), &[]);

    pkgraph(&config)
        .arg("map")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--add-info"));
}

#[test]
fn full_run_then_status() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(
        tmp.path(),
        &[
            ("acme/widget", Some(r#"{"acme/bolt": "^1.0", "php": ">=8.1"}"#)),
            ("acme/bolt", Some("[]")),
        ],
    );

    pkgraph(&config)
        .args(["run", "--yes", "--category", "library"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Processed 2/2 library packages successfully (0 failed).",
        ));

    let output = pkgraph(&config)
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(status["nodes_by_label"]["Package"], 2);
    assert_eq!(status["nodes_by_label"]["Vendor"], 1);
    assert_eq!(status["edges_by_kind"]["REQUIRES"], 1);
    assert_eq!(
        status["constraints"],
        serde_json::json!(["package_full_name", "vendor_name"])
    );
}

#[test]
fn partial_failure_exits_ten_unless_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(
        tmp.path(),
        &[("acme/widget", Some("{}")), ("acme/missing", None)],
    );

    pkgraph(&config)
        .args(["import", "--yes", "--category", "library"])
        .assert()
        .success();

    pkgraph(&config)
        .args(["map", "--add-info", "--add-deps", "--category", "library"])
        .assert()
        .code(10)
        .stdout(predicate::str::contains(
            "Processed 1/2 library packages successfully (1 failed).",
        ));

    pkgraph(&config)
        .args([
            "map",
            "--add-info",
            "--category",
            "library",
            "--allow-partial",
        ])
        .assert()
        .success();
}

#[test]
fn import_skip_reset_keeps_existing_nodes() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(tmp.path(), &[("acme/widget", Some("{}"))]);

    pkgraph(&config)
        .args(["import", "--yes", "--category", "library"])
        .assert()
        .success();
    pkgraph(&config)
        .args(["import", "--skip-reset", "--category", "library"])
        .assert()
        .success();

    let output = pkgraph(&config)
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(status["nodes"], 2);
}

#[test]
fn run_counts_each_failed_package_once() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dataset(
        tmp.path(),
        &[("acme/widget", Some("{}")), ("acme/missing", None)],
    );

    pkgraph(&config)
        .args(["run", "--yes", "--category", "library"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("1 of 2 packages failed."));
}
