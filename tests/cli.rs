//! Command line behaviour.

mod common;

use assert_cmd::Command;
use common::{Workspace, zip_names};
use predicates::prelude::*;

#[allow(deprecated)]
fn bundler_cmd() -> Command {
    let mut cmd = Command::cargo_bin("function_bundler").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_prints_discovered_functions() {
    let ws = Workspace::new();
    ws.write("functions/hello.js", "module.exports = 1;\n");
    ws.write("functions/api/index.js", "module.exports = 2;\n");

    bundler_cmd()
        .args(["--source"])
        .arg(ws.join("functions"))
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("api\tjs"))
        .stdout(predicate::str::contains("hello\tjs"));
}

#[test]
fn packages_every_function_and_exits_zero() {
    let ws = Workspace::new();
    ws.write("functions/hello.js", "module.exports = require('left-pad');\n");
    ws.package("functions/node_modules/left-pad", "left-pad", "1.3.0");

    bundler_cmd()
        .arg("--source")
        .arg(ws.join("functions"))
        .arg("--output")
        .arg(ws.join("dist"))
        .args(["--strategy", "graph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello\tgraph"));

    assert_eq!(
        zip_names(&ws.join("dist/hello.zip")),
        vec![
            "hello.js",
            "node_modules/left-pad/index.js",
            "node_modules/left-pad/package.json",
        ]
    );
}

#[test]
fn any_failed_function_gives_exit_code_one() {
    let ws = Workspace::new();
    ws.write("functions/broken.js", "require('missing-package');\n");
    ws.write("functions/fine.js", "module.exports = 1;\n");

    bundler_cmd()
        .arg("-s")
        .arg(ws.join("functions"))
        .arg("-o")
        .arg(ws.join("dist"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot find module 'missing-package'"))
        .stderr(predicate::str::contains("1 of 2 functions failed"));

    assert!(ws.join("dist/fine.zip").is_file());
}

#[test]
fn missing_source_directory_is_an_error() {
    let ws = Workspace::new();

    bundler_cmd()
        .arg("-s")
        .arg(ws.join("nope"))
        .arg("-o")
        .arg(ws.join("dist"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn config_file_supplies_defaults() {
    let ws = Workspace::new();
    ws.write("functions/hello.js", "require('aws-sdk');\n");
    let config = ws.write(
        "bundler.toml",
        "external_modules = [\"aws-sdk\"]\narchive_format = \"directory\"\n",
    );

    bundler_cmd()
        .arg("-s")
        .arg(ws.join("functions"))
        .arg("-o")
        .arg(ws.join("dist"))
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    assert!(ws.join("dist/hello/hello.js").is_file());
}

#[test]
fn zero_concurrency_is_rejected() {
    let ws = Workspace::new();

    bundler_cmd()
        .arg("-s")
        .arg(ws.join("functions"))
        .arg("-o")
        .arg(ws.join("dist"))
        .args(["--concurrency", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--concurrency must be at least 1"));
}
