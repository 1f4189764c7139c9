//! Phase planning for creation and deletion
//!
//! Resources are grouped by their phase annotation and the phases are run in
//! ascending string order. Inside a phase, resources are grouped by kind and the kind
//! groups follow the [`KindOrder`] tables:
//!
//! - creation: listed kinds in table order, then unlisted kinds in first-seen order
//! - deletion: unlisted kinds in first-seen order, then listed kinds in table order
//!
//! Within a kind group the input order is kept.
//!
//! ```yaml
//! apiVersion: batch/v1
//! kind: Job
//! metadata:
//!   name: db-migrate
//!   annotations:
//!     bosun.io/creation-phase: "1"   # runs after every phase "0" resource
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::order::KindOrder;
use crate::resource::Resource;

/// Kind of CustomResourceDefinition objects
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// Pseudo-kind used by the CRD-aware deletion planner
pub const CUSTOM_RESOURCE_KIND: &str = "CustomResource";

/// A named group of resources executed together
#[derive(Debug, Clone)]
pub struct Phase {
    /// Phase key from the annotation (default "0")
    pub name: String,
    /// Resources in execution order
    pub resources: Vec<Resource>,
}

/// Ordered phases
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub phases: Vec<Phase>,
}

impl Plan {
    /// All resources in execution order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.phases.iter().flat_map(|p| p.resources.iter())
    }

    /// Total resource count
    pub fn len(&self) -> usize {
        self.phases.iter().map(|p| p.resources.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all resources in execution order
    pub fn keys(&self) -> Vec<String> {
        self.resources().map(Resource::key).collect()
    }

    /// Generate a summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            phases: self
                .phases
                .iter()
                .map(|p| PhaseSummary {
                    name: p.name.clone(),
                    resources: p.resources.iter().map(Resource::key).collect(),
                })
                .collect(),
            total_resources: self.len(),
        }
    }
}

/// Summary of a plan for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub phases: Vec<PhaseSummary>,
    pub total_resources: usize,
}

/// Summary of a single phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub name: String,
    pub resources: Vec<String>,
}

impl PlanSummary {
    /// Format as a human-readable string
    pub fn display(&self) -> String {
        let mut lines = vec![format!(
            "Plan: {} resources in {} phases",
            self.total_resources,
            self.phases.len()
        )];

        for phase in &self.phases {
            lines.push(format!(
                "  Phase {}: {} resources",
                phase.name,
                phase.resources.len()
            ));
            for resource in &phase.resources {
                lines.push(format!("    - {}", resource));
            }
        }

        lines.join("\n")
    }
}

/// Orders resource batches using a borrowed [`KindOrder`]
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    order: &'a KindOrder,
}

impl<'a> Planner<'a> {
    pub fn new(order: &'a KindOrder) -> Self {
        Self { order }
    }

    /// Order resources for creation
    pub fn plan_for_creation(&self, resources: Vec<Resource>) -> Plan {
        build_plan(
            resources,
            Resource::creation_phase,
            |r| r.kind().to_string(),
            |kind| match self.order.creation_rank(kind) {
                Some(rank) => (0, rank),
                None => (1, 0),
            },
        )
    }

    /// Order resources for deletion
    pub fn plan_for_deletion(&self, resources: Vec<Resource>) -> Plan {
        build_plan(
            resources,
            Resource::deletion_phase,
            |r| r.kind().to_string(),
            |kind| self.deletion_key(kind),
        )
    }

    /// Order resources for deletion, grouping instances of CRDs found in the
    /// same batch under the `CustomResource` pseudo-kind
    ///
    /// A concrete kind with its own deletion table entry keeps that entry.
    pub fn plan_for_deletion_with_crds(&self, resources: Vec<Resource>) -> Plan {
        let defined = DefinedTypes::from_resources(&resources);

        build_plan(
            resources,
            Resource::deletion_phase,
            |r| {
                let kind = r.kind();
                if kind != CRD_KIND
                    && self.order.deletion_rank(kind).is_none()
                    && defined.contains(r)
                {
                    CUSTOM_RESOURCE_KIND.to_string()
                } else {
                    kind.to_string()
                }
            },
            |kind| self.deletion_key(kind),
        )
    }

    fn deletion_key(&self, kind: &str) -> (u8, usize) {
        match self.order.deletion_rank(kind) {
            Some(rank) => (1, rank),
            None => (0, 0),
        }
    }
}

fn build_plan(
    resources: Vec<Resource>,
    phase_of: impl Fn(&Resource) -> String,
    group_of: impl Fn(&Resource) -> String,
    kind_key: impl Fn(&str) -> (u8, usize),
) -> Plan {
    let mut by_phase: IndexMap<String, Vec<Resource>> = IndexMap::new();
    for resource in resources {
        by_phase.entry(phase_of(&resource)).or_default().push(resource);
    }
    by_phase.sort_by(|a, _, b, _| compare_phases(a, b));

    let phases = by_phase
        .into_iter()
        .map(|(name, resources)| {
            let mut groups: IndexMap<String, Vec<Resource>> = IndexMap::new();
            for resource in resources {
                groups.entry(group_of(&resource)).or_default().push(resource);
            }
            // Stable: unlisted kinds keep their first-seen order
            groups.sort_by(|a, _, b, _| kind_key(a).cmp(&kind_key(b)));

            Phase {
                name,
                resources: groups.into_values().flatten().collect(),
            }
        })
        .collect();

    Plan { phases }
}

/// Phase keys compare as plain strings, so `"10"` runs before `"5"`
///
/// Use zero-padded keys (`"05"`, `"10"`) when more than ten phases are needed.
pub fn compare_phases(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// Whether a pre-flight dry run is meaningful for a creation batch
///
/// CRDs and Namespaces change what the server would accept for later
/// documents, so their presence disables the dry run.
pub fn should_dry_run<'r>(resources: impl IntoIterator<Item = &'r Resource>) -> bool {
    !resources
        .into_iter()
        .any(|r| matches!(r.kind(), CRD_KIND | "Namespace"))
}

/// (group, kind, version) triples defined by CRDs in a batch
struct DefinedTypes(HashSet<(String, String, String)>);

impl DefinedTypes {
    fn from_resources(resources: &[Resource]) -> Self {
        let mut types = HashSet::new();

        for crd in resources.iter().filter(|r| r.kind() == CRD_KIND) {
            let spec = crd.decoded.get("spec");
            let group = spec.and_then(|s| s.get("group")).and_then(Value::as_str);
            let kind = spec
                .and_then(|s| s.get("names"))
                .and_then(|n| n.get("kind"))
                .and_then(Value::as_str);
            let (Some(group), Some(kind)) = (group, kind) else {
                continue;
            };

            let mut versions: Vec<&str> = spec
                .and_then(|s| s.get("versions"))
                .and_then(Value::as_sequence)
                .map(|seq| {
                    seq.iter()
                        .filter_map(|v| v.get("name").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            // apiextensions.k8s.io/v1beta1 single-version form
            if let Some(version) = spec.and_then(|s| s.get("version")).and_then(Value::as_str) {
                versions.push(version);
            }

            for version in versions {
                types.insert((group.to_string(), kind.to_string(), version.to_string()));
            }
        }

        Self(types)
    }

    fn contains(&self, resource: &Resource) -> bool {
        resource.gvk.as_ref().is_some_and(|gvk| {
            self.0
                .contains(&(gvk.group.clone(), gvk.kind.clone(), gvk.version.clone()))
        })
    }
}
