use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

use hrsync_core::{DocumentRefs, Employee, EmployeeId, Institution, InstitutionId, YamlDirectory};

/// Unpaced, no retries, and an HRIMS URL nothing listens on.
const CONFIG: &str = "\
hrims:
  base_url: http://127.0.0.1:9
  api_key: test-key
  token: test-token
  timeout_secs: 2
pipeline:
  employee_delay_ms: 0
  institution_delay_ms: 0
  max_retries: 0
  retry_backoff_ms: 0
";

fn hrsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hrsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("HRIMS_BASE_URL")
        .env_remove("HRIMS_API_KEY")
        .env_remove("HRIMS_TOKEN")
        .env_remove("HRSYNC_DATA_DIR");
    cmd
}

fn employee(id: &str, institution: &str, payroll: Option<&str>, photo: Option<&str>) -> Employee {
    Employee {
        id: EmployeeId::from(id),
        institution_id: InstitutionId::from(institution),
        name: format!("Employee {}", id.to_uppercase()),
        payroll_number: payroll.map(str::to_string),
        national_id: None,
        profile_image: photo.map(str::to_string),
        documents: DocumentRefs::default(),
        certificates: vec![],
    }
}

/// `inst-1` "Ministry of Health": A has a stored photo, C has no identifier.
/// `inst-2` "Ministry of Water": B needs a photo HRIMS cannot deliver.
fn seeded_home() -> TempDir {
    let home = TempDir::new().expect("home");
    let root = home.path().join(".hrsync");
    fs::create_dir_all(&root).expect("create data dir");
    fs::write(root.join("config.yaml"), CONFIG).expect("write config");

    let directory = YamlDirectory::new(&root);
    directory
        .put_institution(
            Institution {
                id: InstitutionId::from("inst-1"),
                name: "Ministry of Health".to_string(),
                vote_number: None,
                tax_id: None,
            },
            vec![
                employee("a", "inst-1", Some("PA"), Some("/api/files/employee-photos/a.jpg")),
                employee("c", "inst-1", None, None),
            ],
        )
        .expect("seed inst-1");
    directory
        .put_institution(
            Institution {
                id: InstitutionId::from("inst-2"),
                name: "Ministry of Water".to_string(),
                vote_number: None,
                tax_id: None,
            },
            vec![employee("b", "inst-2", Some("PB"), None)],
        )
        .expect("seed inst-2");
    home
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn sync_skips_stored_and_unidentified_employees_without_network() {
    let home = seeded_home();
    let assert = hrsync_cmd(home.path())
        .args(["sync", "photos", "--institution", "inst-1", "--json"])
        .assert()
        .success();
    let report = stdout_json(assert.get_output());

    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["skipped"], 2);
    assert_eq!(report["results"][0]["message"], "Photo already stored");
    assert_eq!(report["results"][1]["message"], "No payroll number or national id");
}

#[test]
fn employee_failures_do_not_fail_the_process() {
    let home = seeded_home();
    let assert = hrsync_cmd(home.path())
        .args(["sync", "photos", "--json"])
        .assert()
        .success();
    let report = stdout_json(assert.get_output());

    assert_eq!(report["summary"]["total"], 3);
    assert_eq!(report["summary"]["failed"], 1, "B cannot reach HRIMS");
    assert_eq!(report["summary"]["skipped"], 2);
    assert_eq!(report["institutions"].as_array().map(Vec::len), Some(2));
}

#[test]
fn table_report_lists_failures_with_reasons() {
    let home = seeded_home();
    hrsync_cmd(home.path())
        .args(["sync", "photos", "--institution", "inst-2"])
        .assert()
        .success()
        .stdout(contains("[1/1]"))
        .stdout(contains("Needs attention"))
        .stdout(contains("Employee B (b)"));
}

#[test]
fn after_unknown_institution_fails_loudly() {
    let home = seeded_home();
    hrsync_cmd(home.path())
        .args(["sync", "photos", "--after", "Ministry of Fisheries"])
        .assert()
        .failure()
        .stderr(contains("boundary institution 'Ministry of Fisheries' not found"));
    assert!(
        !home.path().join(".hrsync/checkpoints/photos.json").exists(),
        "a refused run leaves no checkpoint"
    );
}

#[test]
fn after_boundary_runs_only_later_institutions() {
    let home = seeded_home();
    let assert = hrsync_cmd(home.path())
        .args(["sync", "photos", "--after", "ministry of health", "--json"])
        .assert()
        .success();
    let report = stdout_json(assert.get_output());
    assert_eq!(report["institutions"][0]["name"], "Ministry of Water");
    assert_eq!(report["summary"]["total"], 1);
}

#[test]
fn unknown_institution_is_a_setup_error() {
    let home = seeded_home();
    hrsync_cmd(home.path())
        .args(["sync", "documents", "--institution", "nope"])
        .assert()
        .failure()
        .stderr(contains("institution 'nope' not found"));
}

#[test]
fn missing_credentials_are_reported_before_any_work() {
    let home = TempDir::new().expect("home");
    hrsync_cmd(home.path())
        .args(["sync", "photos"])
        .assert()
        .failure()
        .stderr(contains("HRIMS_BASE_URL"));
}

#[test]
fn bulk_is_rejected_for_documents() {
    let home = seeded_home();
    hrsync_cmd(home.path())
        .args(["sync", "documents", "--bulk"])
        .assert()
        .failure()
        .stderr(contains("--bulk only applies to photos"));
}

#[test]
fn status_reports_checkpoints() {
    let home = seeded_home();
    hrsync_cmd(home.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(contains("No runs recorded yet"));

    hrsync_cmd(home.path())
        .args(["sync", "photos", "--institution", "inst-1", "--quiet"])
        .assert()
        .success();

    let assert = hrsync_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success();
    let checkpoints = stdout_json(assert.get_output());
    let photos = &checkpoints[0];
    assert_eq!(photos["artifact"], "photos");
    assert_eq!(photos["finished"], true);
    assert_eq!(photos["lastOffset"], 2);
    assert_eq!(photos["summary"]["skipped"], 2);

    hrsync_cmd(home.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(contains("FINISHED"))
        .stdout(contains("institutions inst-1"));
}

#[test]
fn trigger_without_server_fails_with_address() {
    let home = seeded_home();
    hrsync_cmd(home.path())
        .args(["trigger", "photos", "--url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(contains("127.0.0.1:9"));
}
