//! Annotation parsing with Helm compatibility
//!
//! Bosun reads its own `bosun.io/*` annotations and, where Helm defines an
//! equivalent (hook delete policies), falls back to the `helm.sh/*` key.

use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Bosun-native annotations
pub mod bosun {
    /// Phase (weight) used when ordering creation
    pub const CREATION_PHASE: &str = "bosun.io/creation-phase";
    /// Phase (weight) used when ordering deletion
    pub const DELETION_PHASE: &str = "bosun.io/deletion-phase";
    /// Block the deploy until this resource is ready
    pub const WAIT_FOR_READY: &str = "bosun.io/wait-for-ready";
    /// Block the deploy until property paths equal literal values
    pub const WAIT_FOR_PROPERTIES: &str = "bosun.io/wait-for-properties";
    /// Owning application slug stamped onto applied objects
    pub const APP_SLUG: &str = "bosun.io/app-slug";
    /// Keep the resource when a later version no longer contains it
    pub const KEEP: &str = "bosun.io/keep";
    /// Hook delete policy
    pub const HOOK_DELETE_POLICY: &str = "bosun.io/hook-delete-policy";
}

/// Helm-compatible annotations (for migration)
pub mod helm {
    /// Hook delete policy
    pub const HOOK_DELETE_POLICY: &str = "helm.sh/hook-delete-policy";
}

/// Labels the engine inspects
pub mod labels {
    /// Resources carrying this label with value "true" are not part of backups
    pub const EXCLUDE_FROM_BACKUP: &str = "velero.io/exclude-from-backup";
}

/// Default phase for resources without a phase annotation
pub const DEFAULT_PHASE: &str = "0";

/// Get annotation value, preferring Bosun over Helm
pub fn get_annotation<'a>(
    annotations: &'a BTreeMap<String, String>,
    bosun_key: &str,
    helm_key: &str,
) -> Option<&'a str> {
    annotations
        .get(bosun_key)
        .or_else(|| annotations.get(helm_key))
        .map(|s| s.as_str())
}

/// Interpret a boolean annotation/label value
pub fn is_true(value: Option<&str>) -> bool {
    value
        .map(|s| s.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Creation phase (default: "0")
pub fn creation_phase(annotations: &BTreeMap<String, String>) -> String {
    phase_value(annotations, bosun::CREATION_PHASE)
}

/// Deletion phase (default: "0")
pub fn deletion_phase(annotations: &BTreeMap<String, String>) -> String {
    phase_value(annotations, bosun::DELETION_PHASE)
}

fn phase_value(annotations: &BTreeMap<String, String>, key: &str) -> String {
    annotations
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_PHASE)
        .to_string()
}

/// Whether the resource asks the deploy to wait for readiness
pub fn wants_wait_for_ready(annotations: &BTreeMap<String, String>) -> bool {
    is_true(annotations.get(bosun::WAIT_FOR_READY).map(String::as_str))
}

/// Whether the resource must survive a delete-diff
pub fn has_keep(annotations: &BTreeMap<String, String>) -> bool {
    is_true(annotations.get(bosun::KEEP).map(String::as_str))
}

/// Whether the resource is excluded from backups
pub fn excluded_from_backup(labels: &BTreeMap<String, String>) -> bool {
    labels.get(labels::EXCLUDE_FROM_BACKUP).map(String::as_str) == Some("true")
}

/// A single `.path=value` requirement from `wait-for-properties`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyWait {
    pub path: String,
    pub value: String,
}

/// Parse wait-for-properties
/// Format: ".path=value" or ".path=value,.path2=value2"
///
/// Entries without `=` are configuration errors. Path syntax itself is
/// validated later, when the wait runs.
pub fn parse_wait_for_properties(
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<PropertyWait>> {
    let Some(raw) = annotations.get(bosun::WAIT_FOR_PROPERTIES) else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (path, value) =
                entry
                    .split_once('=')
                    .ok_or_else(|| CoreError::InvalidPropertyWait {
                        entry: entry.to_string(),
                    })?;
            Ok(PropertyWait {
                path: path.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Hook delete policy, matched by substring as Helm does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookDeletePolicy {
    pub on_success: bool,
    pub on_failure: bool,
}

impl HookDeletePolicy {
    /// Whether any automatic cleanup applies
    pub fn is_set(&self) -> bool {
        self.on_success || self.on_failure
    }
}

/// Parse hook delete policy
pub fn parse_hook_delete_policy(annotations: &BTreeMap<String, String>) -> HookDeletePolicy {
    match get_annotation(
        annotations,
        bosun::HOOK_DELETE_POLICY,
        helm::HOOK_DELETE_POLICY,
    ) {
        Some(value) => HookDeletePolicy {
            on_success: value.contains("hook-succeeded"),
            on_failure: value.contains("hook-failed"),
        },
        None => HookDeletePolicy::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_annotation_prefers_bosun() {
        let annotations = make_annotations(&[
            ("bosun.io/hook-delete-policy", "hook-failed"),
            ("helm.sh/hook-delete-policy", "hook-succeeded"),
        ]);

        let result = get_annotation(
            &annotations,
            bosun::HOOK_DELETE_POLICY,
            helm::HOOK_DELETE_POLICY,
        );
        assert_eq!(result, Some("hook-failed"));
    }

    #[test]
    fn test_get_annotation_falls_back_to_helm() {
        let annotations = make_annotations(&[("helm.sh/hook-delete-policy", "hook-succeeded")]);
        let policy = parse_hook_delete_policy(&annotations);
        assert!(policy.on_success);
        assert!(!policy.on_failure);
    }

    #[test]
    fn test_phases_default_to_zero() {
        let empty = BTreeMap::new();
        assert_eq!(creation_phase(&empty), "0");
        assert_eq!(deletion_phase(&empty), "0");

        let annotations = make_annotations(&[
            ("bosun.io/creation-phase", "-2"),
            ("bosun.io/deletion-phase", " "),
        ]);
        assert_eq!(creation_phase(&annotations), "-2");
        assert_eq!(deletion_phase(&annotations), "0");
    }

    #[test]
    fn test_boolean_annotations() {
        let annotations = make_annotations(&[
            ("bosun.io/wait-for-ready", "TRUE"),
            ("bosun.io/keep", "yes"),
        ]);
        assert!(wants_wait_for_ready(&annotations));
        assert!(!has_keep(&annotations));

        let annotations = make_annotations(&[("bosun.io/keep", "true")]);
        assert!(has_keep(&annotations));
    }

    #[test]
    fn test_exclude_from_backup_is_exact() {
        let labels = make_annotations(&[("velero.io/exclude-from-backup", "true")]);
        assert!(excluded_from_backup(&labels));

        let labels = make_annotations(&[("velero.io/exclude-from-backup", "True")]);
        assert!(!excluded_from_backup(&labels));
    }

    #[test]
    fn test_parse_wait_for_properties() {
        let annotations = make_annotations(&[(
            "bosun.io/wait-for-properties",
            ".status.phase=Running, .status.ready=true",
        )]);
        let waits = parse_wait_for_properties(&annotations).unwrap();
        assert_eq!(waits.len(), 2);
        assert_eq!(waits[0].path, ".status.phase");
        assert_eq!(waits[0].value, "Running");
        assert_eq!(waits[1].path, ".status.ready");
        assert_eq!(waits[1].value, "true");
    }

    #[test]
    fn test_parse_wait_for_properties_rejects_missing_value() {
        let annotations = make_annotations(&[("bosun.io/wait-for-properties", ".status.phase")]);
        assert!(parse_wait_for_properties(&annotations).is_err());
    }

    #[test]
    fn test_hook_delete_policy_both() {
        let annotations = make_annotations(&[(
            "bosun.io/hook-delete-policy",
            "hook-succeeded,hook-failed",
        )]);
        let policy = parse_hook_delete_policy(&annotations);
        assert!(policy.on_success && policy.on_failure);
        assert!(policy.is_set());

        let policy = parse_hook_delete_policy(&BTreeMap::new());
        assert!(!policy.is_set());
    }
}
