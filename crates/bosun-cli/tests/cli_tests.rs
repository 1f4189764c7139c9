//! End-to-end tests for the offline commands

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Run bosun with a config path that does not exist, so defaults apply
fn bosun(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_bosun"))
        .args(args)
        .arg("--config")
        .arg(dir.join("missing-config.yaml"))
        .args(["--namespace", "shop"])
        .env_remove("BOSUN_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute bosun");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write(dir: &TempDir, name: &str, docs: &[&str]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, docs.join("---\n")).unwrap();
    path
}

const NAMESPACE: &str = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: app\n";
const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n";
const KEPT_CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  annotations:\n    bosun.io/keep: \"true\"\n";
const SERVICE: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";
const DEPLOYMENT: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  annotations:\n    bosun.io/creation-phase: \"5\"\n";
const INGRESS: &str = "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: web\n  annotations:\n    bosun.io/creation-phase: \"10\"\n";
const BROKEN: &str = "kind: [oops\n";

mod plan_command {
    use super::*;

    #[test]
    fn test_creation_plan_text() {
        let dir = TempDir::new().unwrap();
        let manifests = write(&dir, "app.yaml", &[INGRESS, DEPLOYMENT, CONFIG_MAP, NAMESPACE]);

        let (stdout, stderr, success) = bosun(dir.path(), &["plan", manifests.to_str().unwrap()]);

        assert!(success, "stderr: {}", stderr);
        insta::assert_snapshot!(stdout.trim_end(), @r#"
CREATION PLAN
Plan: 4 resources in 3 phases
  Phase 0: 2 resources
    - Namespace/app
    - ConfigMap/cfg
  Phase 10: 1 resources
    - Ingress/web
  Phase 5: 1 resources
    - Deployment/web
"#);
    }

    #[test]
    fn test_deletion_plan_json() {
        let dir = TempDir::new().unwrap();
        let manifests = write(&dir, "app.yaml", &[NAMESPACE, CONFIG_MAP, SERVICE]);

        let (stdout, stderr, success) = bosun(
            dir.path(),
            &["plan", "--deletion", "--json", manifests.to_str().unwrap()],
        );

        assert!(success, "stderr: {}", stderr);
        insta::assert_snapshot!(stdout.trim_end(), @r#"
{
  "phases": [
    {
      "name": "0",
      "resources": [
        "Service/web",
        "ConfigMap/cfg",
        "Namespace/app"
      ]
    }
  ],
  "total_resources": 3
}
"#);
    }

    #[test]
    fn test_missing_manifest_file_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yaml");

        let (stdout, stderr, success) = bosun(dir.path(), &["plan", missing.to_str().unwrap()]);

        assert!(!success);
        assert!(stdout.is_empty());
        assert!(stderr.contains("cannot read"), "stderr: {}", stderr);
    }
}

mod diff_command {
    use super::*;

    #[test]
    fn test_diff_lists_deletions_json() {
        let dir = TempDir::new().unwrap();
        let previous = write(
            &dir,
            "previous.yaml",
            &[NAMESPACE, BROKEN, DEPLOYMENT, KEPT_CONFIG_MAP, SERVICE],
        );
        let current = write(&dir, "current.yaml", &[SERVICE]);

        let (stdout, stderr, success) = bosun(
            dir.path(),
            &[
                "diff",
                "--json",
                "--previous",
                previous.to_str().unwrap(),
                current.to_str().unwrap(),
            ],
        );

        assert!(success, "stderr: {}", stderr);
        insta::assert_snapshot!(stdout.trim_end(), @r#"
{
  "phases": [
    {
      "name": "0",
      "resources": [
        "<unidentified>",
        "Deployment/web",
        "Namespace/app"
      ]
    }
  ],
  "total_resources": 3
}
"#);
    }

    #[test]
    fn test_identical_versions_delete_nothing() {
        let dir = TempDir::new().unwrap();
        let previous = write(&dir, "previous.yaml", &[NAMESPACE, SERVICE]);
        let current = write(&dir, "current.yaml", &[SERVICE, NAMESPACE]);

        let (stdout, stderr, success) = bosun(
            dir.path(),
            &["diff", "--previous", previous.to_str().unwrap(), current.to_str().unwrap()],
        );

        assert!(success, "stderr: {}", stderr);
        insta::assert_snapshot!(stdout.trim_end(), @r#"
DELETIONS
  nothing to do
"#);
    }
}
