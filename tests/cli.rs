use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

/// A throwaway suite install with local devices.
struct Suite {
    dir: tempfile::TempDir,
}

impl Suite {
    fn new(devices: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["testcases", "plans", "results"] {
            fs::create_dir_all(dir.path().join("repository").join(sub)).unwrap();
        }

        let mut config = format!(
            "[suite]\nname = \"CTS\"\nversion = \"9.0\"\nroot = '{}'\nsupported_abis = [\"x86_64\"]\n",
            dir.path().display()
        );
        for index in 0..devices {
            let working_dir = dir.path().join(format!("device-{}", index));
            fs::create_dir_all(&working_dir).unwrap();
            config.push_str(&format!(
                "\n[[devices]]\ntype = \"local\"\nserial = \"host-{}\"\nworking_dir = '{}'\n",
                index,
                working_dir.display()
            ));
        }
        fs::write(dir.path().join("compat.toml"), config).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("compat.toml")
    }

    fn module(&self, name: &str, cases: &[&str]) -> &Self {
        let options: String = cases
            .iter()
            .map(|case| format!("    <option name=\"case\" value=\"{}\"/>\n", case))
            .collect();
        let config = format!(
            "<configuration description=\"{name}\">\n  <test class=\"shell-test\">\n    <option name=\"class\" value=\"android.{name}\"/>\n{options}  </test>\n</configuration>\n"
        );
        fs::write(self.testcases().join(format!("{}.config", name)), config).unwrap();
        self
    }

    fn testcases(&self) -> PathBuf {
        self.dir.path().join("repository").join("testcases")
    }

    fn result_file(&self, session: u32) -> PathBuf {
        self.dir
            .path()
            .join("repository")
            .join("results")
            .join(session.to_string())
            .join("test_result.xml")
    }

    fn compat(&self) -> Command {
        let mut cmd = Command::cargo_bin("compat").unwrap();
        cmd.arg("--config").arg(self.config());
        cmd
    }

    fn sessions(&self) -> Vec<Value> {
        let output = self
            .compat()
            .args(["list", "results", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        match serde_json::from_slice(&output).unwrap() {
            Value::Array(sessions) => sessions,
            other => panic!("expected an array, got {other:?}"),
        }
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("compat")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn validate_reports_missing_config() {
    Command::cargo_bin("compat")
        .unwrap()
        .args(["--config", "/nonexistent/compat.toml", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn validate_accepts_a_suite() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testA=true"]);
    suite
        .compat()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"))
        .stdout(predicate::str::contains("Modules: 1"));
}

#[test]
fn validate_rejects_unknown_component() {
    let suite = Suite::new(1);
    fs::write(
        suite.testcases().join("CtsBad.config"),
        "<configuration><test class=\"no-such-runner\"/></configuration>",
    )
    .unwrap();
    suite
        .compat()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CtsBad.config"));
}

#[test]
fn passing_run_exits_zero() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testA=true", "testB=test 1 -eq 1"]);

    suite
        .compat()
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("All tests passed!"));

    let xml = read(&suite.result_file(0));
    assert!(xml.contains("suite-name=\"CTS\""), "{xml}");
    assert!(xml.contains("devices=\"host-0\""), "{xml}");
    assert!(xml.contains("<Module name=\"CtsFoo\" abi=\"x86_64\""), "{xml}");
}

#[test]
fn failures_are_retried_from_the_session() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testPass=true", "testFail=false"]);
    suite.module("CtsBar", &["testPass=true"]);

    suite
        .compat()
        .arg("run")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Some tests failed."));

    let sessions = suite.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["passed"], 2);
    assert_eq!(sessions[0]["failed"], 1);

    suite.compat().args(["run", "--retry", "0"]).assert().code(1);

    // The retry updates session 0 in place and keeps its passing tests.
    let sessions = suite.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["passed"], 2);
    assert_eq!(sessions[0]["failed"], 1);
    let xml = read(&suite.result_file(0));
    assert!(xml.contains("retry-session=\"0\""), "{xml}");
    assert!(xml.contains("testFail"), "{xml}");
    assert!(xml.contains("testPass"), "{xml}");
    assert!(!suite.result_file(1).exists());
}

#[test]
fn retry_of_a_passing_session_has_nothing_to_do() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testPass=true"]);
    suite.module("CtsBar", &["testPass=true"]);
    suite.compat().arg("run").assert().success();

    suite
        .compat()
        .args(["run", "--retry", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to retry"));
    assert_eq!(suite.sessions()[0]["passed"], 2);
}

#[test]
fn module_arg_selects_its_module() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testA=true"]);
    suite.module("CtsBar", &["testA=true"]);

    suite
        .compat()
        .args(["run", "--module-arg", "CtsBar:case:testExtra=true"])
        .assert()
        .success();

    let xml = read(&suite.result_file(0));
    assert!(xml.contains("testExtra"), "{xml}");
    assert!(!xml.contains("CtsFoo"), "{xml}");
}

#[test]
fn single_module_and_test() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testA=true", "testB=false"]);
    suite.module("CtsBar", &["testA=false"]);

    suite
        .compat()
        .args(["run", "--module", "CtsF.*", "--test", "android.CtsFoo#testA"])
        .assert()
        .success();

    let xml = read(&suite.result_file(0));
    assert!(xml.contains("CtsFoo"), "{xml}");
    assert!(!xml.contains("CtsBar"), "{xml}");
    assert!(!xml.contains("testB"), "{xml}");
}

#[test]
fn unknown_module_is_rejected() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testA=true"]);
    suite
        .compat()
        .args(["run", "--module", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No modules found matching Nope"));
}

#[test]
fn shards_use_one_device_each() {
    let suite = Suite::new(2);
    for name in ["CtsA", "CtsB", "CtsC"] {
        suite.module(name, &["testA=true"]);
    }

    suite.compat().args(["run", "--shard", "2"]).assert().success();

    let sessions = suite.sessions();
    assert_eq!(sessions[0]["passed"], 3);
    assert_eq!(
        sessions[0]["devices"],
        serde_json::json!(["host-0", "host-1"])
    );
}

#[test]
fn too_many_shards_for_devices() {
    let suite = Suite::new(1);
    suite
        .compat()
        .args(["run", "--shard", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only 1 devices configured"));
}

#[test]
fn list_modules_and_plans() {
    let suite = Suite::new(1);
    suite.module("CtsFoo", &["testA=true"]);
    suite.module("CtsBar", &["testA=true"]);
    fs::write(
        suite.dir.path().join("repository/plans/smoke.xml"),
        "<TestPlan name=\"smoke\" version=\"1.0\"><Module name=\"CtsFoo\"/></TestPlan>",
    )
    .unwrap();

    suite
        .compat()
        .args(["list", "modules"])
        .assert()
        .success()
        .stdout("x86_64 CtsBar\nx86_64 CtsFoo\n");

    suite
        .compat()
        .args(["list", "plans", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"smoke\""));
}
