//! Delete-diff between two manifest versions
//!
//! Anything the previous version had and the current one no longer has is a
//! deletion candidate. Candidates survive when:
//!
//! - they are a `Namespace` the caller is retaining
//! - in restore mode, they carry the exclude-from-backup label or fail the
//!   restore label selector
//! - they carry `bosun.io/keep: "true"`
//!
//! Documents that could not be identified are compared by their trimmed raw
//! text. One that vanished from the current version is deleted from that
//! text like any other resource and lands in the planner's default bucket.

use std::collections::HashSet;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use tracing::{debug, warn};

use crate::annotations;
use crate::order::KindOrder;
use crate::plan::{Plan, Planner};
use crate::resource::{Resource, parse_manifests};
use crate::selector::selector_matches;

/// Policy inputs to the diff
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Namespace applied to objects that do not declare one
    pub target_namespace: String,
    /// Whether this deploy restores a backup
    pub restore_mode: bool,
    /// Only objects matching this selector are deleted in restore mode
    pub restore_selector: Option<LabelSelector>,
    /// Namespaces that must never be deleted
    pub retained_namespaces: Vec<String>,
}

/// Why a previous-only resource is not deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainReason {
    RetainedNamespace,
    ExcludedFromBackup,
    SelectorMismatch,
    Keep,
}

impl fmt::Display for RetainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::RetainedNamespace => "namespace is retained",
            Self::ExcludedFromBackup => "excluded from backup",
            Self::SelectorMismatch => "does not match restore selector",
            Self::Keep => "keep annotation",
        };
        f.write_str(reason)
    }
}

/// Identity key: `<apiVersion>-<kind>-<name>-<namespace>`
pub fn resource_key(resource: &Resource, target_namespace: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        resource.api_version(),
        resource.kind(),
        resource.name(),
        resource.namespace().unwrap_or(target_namespace)
    )
}

/// Retention exception for a previous-only resource, if one applies
pub fn retain_reason(resource: &Resource, options: &DiffOptions) -> Option<RetainReason> {
    if resource.kind() == "Namespace"
        && options
            .retained_namespaces
            .iter()
            .any(|ns| ns == resource.name())
    {
        return Some(RetainReason::RetainedNamespace);
    }

    if options.restore_mode {
        if annotations::excluded_from_backup(resource.labels()) {
            return Some(RetainReason::ExcludedFromBackup);
        }
        let selected = options
            .restore_selector
            .as_ref()
            .is_none_or(|selector| selector_matches(selector, resource.labels()));
        if !selected {
            return Some(RetainReason::SelectorMismatch);
        }
    }

    if annotations::has_keep(resource.annotations()) {
        return Some(RetainReason::Keep);
    }

    None
}

/// Resources present in `previous` but not in `current`, minus retention
/// exceptions, in `previous` order
///
/// Unidentified documents are keyed by their trimmed raw text.
pub fn compute_deletions(
    previous: &[Resource],
    current: &[Resource],
    options: &DiffOptions,
) -> Vec<Resource> {
    let current_keys: HashSet<String> = current
        .iter()
        .map(|r| diff_key(r, &options.target_namespace))
        .collect();

    let mut seen = HashSet::new();
    let mut deletions = Vec::new();

    for resource in previous {
        let key = diff_key(resource, &options.target_namespace);
        if current_keys.contains(&key) || !seen.insert(key.clone()) {
            continue;
        }

        if !resource.is_identified() {
            warn!(
                error = resource.decode_error.as_deref().unwrap_or_default(),
                "deleting unidentified document from raw text"
            );
            deletions.push(resource.clone());
            continue;
        }

        if let Some(reason) = retain_reason(resource, options) {
            debug!(resource = %key, %reason, "retaining resource");
            continue;
        }

        deletions.push(resource.clone());
    }

    deletions
}

fn diff_key(resource: &Resource, default_namespace: &str) -> String {
    if resource.is_identified() {
        resource_key(resource, default_namespace)
    } else {
        format!("raw:{}", resource.raw.trim())
    }
}

/// Diff two manifest texts and order the deletions for execution
pub fn plan_deletions(
    previous_manifests: &str,
    current_manifests: &str,
    options: &DiffOptions,
    order: &KindOrder,
) -> Plan {
    let previous = parse_manifests(previous_manifests);
    let current = parse_manifests(current_manifests);
    let deletions = compute_deletions(&previous, &current, options);
    Planner::new(order).plan_for_deletion_with_crds(deletions)
}
