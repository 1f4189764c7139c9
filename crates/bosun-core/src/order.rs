//! Kind-priority tables used by the planner
//!
//! The tables are built once (usually with [`KindOrder::standard`]) and passed
//! by reference into the planner; nothing registers kinds globally.

use std::collections::HashMap;

/// Creation order: namespaces and policy objects first, workloads in the
/// middle, network-facing objects last.
const CREATION_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "SecretList",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleList",
    "ClusterRoleBinding",
    "ClusterRoleBindingList",
    "Role",
    "RoleList",
    "RoleBinding",
    "RoleBindingList",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "IngressClass",
    "Ingress",
    "APIService",
];

/// Deletion order: network-facing objects first, then workloads, then
/// policy/RBAC/storage, namespaces last.
const DELETION_ORDER: &[&str] = &[
    "APIService",
    "Ingress",
    "IngressClass",
    "CronJob",
    "Job",
    "StatefulSet",
    "HorizontalPodAutoscaler",
    "Deployment",
    "ReplicaSet",
    "ReplicationController",
    "Pod",
    "DaemonSet",
    "Service",
    "RoleBindingList",
    "RoleBinding",
    "RoleList",
    "Role",
    "ClusterRoleBindingList",
    "ClusterRoleBinding",
    "ClusterRoleList",
    "ClusterRole",
    "CustomResourceDefinition",
    "PersistentVolumeClaim",
    "PersistentVolume",
    "StorageClass",
    "ConfigMap",
    "SecretList",
    "Secret",
    "ServiceAccount",
    "PodDisruptionBudget",
    "PodSecurityPolicy",
    "LimitRange",
    "ResourceQuota",
    "NetworkPolicy",
    "Namespace",
];

/// Ranked kind tables for creation and deletion
#[derive(Debug, Clone)]
pub struct KindOrder {
    creation: HashMap<String, usize>,
    deletion: HashMap<String, usize>,
}

impl KindOrder {
    /// Build from explicit lists (earlier entries are handled first)
    pub fn new<C, D>(creation: C, deletion: D) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            creation: rank(creation),
            deletion: rank(deletion),
        }
    }

    /// The built-in tables
    pub fn standard() -> Self {
        Self::new(
            CREATION_ORDER.iter().copied(),
            DELETION_ORDER.iter().copied(),
        )
    }

    /// Position of a kind in the creation table
    pub fn creation_rank(&self, kind: &str) -> Option<usize> {
        self.creation.get(kind).copied()
    }

    /// Position of a kind in the deletion table
    pub fn deletion_rank(&self, kind: &str) -> Option<usize> {
        self.deletion.get(kind).copied()
    }
}

impl Default for KindOrder {
    fn default() -> Self {
        Self::standard()
    }
}

fn rank<I>(kinds: I) -> HashMap<String, usize>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut ranks = HashMap::new();
    for (index, kind) in kinds.into_iter().enumerate() {
        ranks.entry(kind.into()).or_insert(index);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_creation_ranks() {
        let order = KindOrder::standard();
        let ns = order.creation_rank("Namespace").unwrap();
        let cm = order.creation_rank("ConfigMap").unwrap();
        let ing = order.creation_rank("Ingress").unwrap();
        assert!(ns < cm && cm < ing);
        assert_eq!(order.creation_rank("Widget"), None);
    }

    #[test]
    fn test_deletion_reverses_creation() {
        let order = KindOrder::standard();
        for a in CREATION_ORDER {
            for b in CREATION_ORDER {
                let (ca, cb) = (order.creation_rank(a), order.creation_rank(b));
                let (da, db) = (order.deletion_rank(a), order.deletion_rank(b));
                if ca < cb {
                    assert!(da > db, "{} vs {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_custom_tables() {
        let order = KindOrder::new(["B", "A"], ["A", "B"]);
        assert_eq!(order.creation_rank("B"), Some(0));
        assert_eq!(order.deletion_rank("B"), Some(1));
    }
}
