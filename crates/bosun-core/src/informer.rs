//! Status informer declarations
//!
//! An informer is written `[namespace/]kind/name`, e.g. `default/deploy/web`
//! or `svc/web`. Kinds are normalized through an alias table before use.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::state::ResourceKey;

static INFORMER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([^/]+)/)?([^/]+)/([^/]+)$").expect("informer pattern is valid")
});

/// A declared "watch this object" instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusInformer {
    pub kind: String,
    pub name: String,
    /// Empty until defaulted by [`StatusInformer::normalize`]
    #[serde(default)]
    pub namespace: String,
}

impl StatusInformer {
    /// Parse the `[namespace/]kind/name` form
    pub fn parse(input: &str) -> Result<Self> {
        input.parse()
    }

    /// Resolve the kind alias and default the namespace
    pub fn normalize(&self, target_namespace: &str, aliases: &KindAliases) -> Self {
        Self {
            kind: aliases.resolve(&self.kind),
            name: self.name.clone(),
            namespace: if self.namespace.is_empty() {
                target_namespace.to_string()
            } else {
                self.namespace.clone()
            },
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.kind, &self.name)
    }
}

impl FromStr for StatusInformer {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = INFORMER_RE
            .captures(s.trim())
            .ok_or_else(|| CoreError::InvalidInformer {
                input: s.to_string(),
            })?;

        Ok(Self {
            namespace: caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            kind: caps[2].to_string(),
            name: caps[3].to_string(),
        })
    }
}

impl fmt::Display for StatusInformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

/// Parse and normalize a list of informer strings
pub fn parse_informers<S: AsRef<str>>(
    inputs: &[S],
    target_namespace: &str,
    aliases: &KindAliases,
) -> Result<Vec<StatusInformer>> {
    inputs
        .iter()
        .map(|s| StatusInformer::parse(s.as_ref()).map(|i| i.normalize(target_namespace, aliases)))
        .collect()
}

/// Kind alias table (short names and plurals to canonical lowercase kinds)
#[derive(Debug, Clone, Default)]
pub struct KindAliases {
    aliases: HashMap<String, String>,
}

impl KindAliases {
    /// The built-in aliases
    pub fn standard() -> Self {
        Self::default()
            .with("deployment", &["deploy", "deployments"])
            .with("statefulset", &["sts", "statefulsets"])
            .with("daemonset", &["ds", "daemonsets"])
            .with("service", &["svc", "services"])
            .with("ingress", &["ing", "ingresses"])
            .with("persistentvolumeclaim", &["pvc", "persistentvolumeclaims"])
    }

    /// Register aliases for a canonical kind
    pub fn with(mut self, canonical: &str, aliases: &[&str]) -> Self {
        let canonical = canonical.to_lowercase();
        for alias in aliases {
            self.aliases.insert(alias.to_lowercase(), canonical.clone());
        }
        self
    }

    /// Canonical lowercase kind
    pub fn resolve(&self, kind: &str) -> String {
        let lower = kind.to_lowercase();
        self.aliases.get(&lower).cloned().unwrap_or(lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        let informer = StatusInformer::parse("default/deploy/sentry-web").unwrap();
        assert_eq!(informer.namespace, "default");
        assert_eq!(informer.kind, "deploy");
        assert_eq!(informer.name, "sentry-web");
    }

    #[test]
    fn test_parse_without_namespace() {
        let informer: StatusInformer = "svc/web".parse().unwrap();
        assert_eq!(informer.namespace, "");
        assert_eq!(informer.kind, "svc");
        assert_eq!(informer.name, "web");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(StatusInformer::parse("sentry-web").is_err());
        assert!(StatusInformer::parse("a/b/c/d").is_err());
        assert!(StatusInformer::parse("ns//web").is_err());
        assert!(StatusInformer::parse("").is_err());
    }

    #[test]
    fn test_normalize() {
        let aliases = KindAliases::standard();
        let informer = StatusInformer::parse("sts/db").unwrap().normalize("prod", &aliases);
        assert_eq!(informer.kind, "statefulset");
        assert_eq!(informer.namespace, "prod");

        let informer = StatusInformer::parse("other/Deployment/web")
            .unwrap()
            .normalize("prod", &aliases);
        assert_eq!(informer.kind, "deployment");
        assert_eq!(informer.namespace, "other");
    }

    #[test]
    fn test_aliases() {
        let aliases = KindAliases::standard();
        assert_eq!(aliases.resolve("PVC"), "persistentvolumeclaim");
        assert_eq!(aliases.resolve("ing"), "ingress");
        assert_eq!(aliases.resolve("ds"), "daemonset");
        assert_eq!(aliases.resolve("svc"), "service");
        assert_eq!(aliases.resolve("Widget"), "widget");

        let aliases = aliases.with("cronjob", &["cj"]);
        assert_eq!(aliases.resolve("cj"), "cronjob");
    }

    #[test]
    fn test_parse_informers() {
        let aliases = KindAliases::standard();
        let informers =
            parse_informers(&["deploy/web", "kube-system/svc/dns"], "app", &aliases).unwrap();
        assert_eq!(informers[0].key(), ResourceKey::new("app", "deployment", "web"));
        assert_eq!(informers[1].key(), ResourceKey::new("kube-system", "service", "dns"));

        assert!(parse_informers(&["nope"], "app", &aliases).is_err());
    }
}
