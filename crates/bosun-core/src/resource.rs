//! Resource classification
//!
//! Manifest documents are decoded into [`Resource`] records. A document that
//! cannot be decoded is not dropped: it is kept with its raw text, no GVK and
//! the decode error, so later stages can still hand it to the applier.

use std::collections::BTreeMap;
use std::fmt;

use serde_yaml::Value;
use tracing::debug;

use crate::annotations;

/// Group/Version/Kind of a Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    /// Build from an `apiVersion` string and a kind
    ///
    /// - "apps/v1" -> group="apps", version="v1"
    /// - "v1" -> group="", version="v1" (core API)
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.rsplit_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    /// Render back to an `apiVersion` string
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// The metadata fields the engine inspects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMeta {
    pub name: String,
    pub namespace: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// A manifest document with its decoded identity
#[derive(Debug, Clone)]
pub struct Resource {
    /// The document text as supplied
    pub raw: String,
    /// `None` when the document could not be identified
    pub gvk: Option<Gvk>,
    /// Decoded YAML tree (`Null` when decoding failed)
    pub decoded: Value,
    /// Metadata extracted from the decoded tree
    pub metadata: ResourceMeta,
    /// Why identification failed, if it did
    pub decode_error: Option<String>,
}

impl Resource {
    /// Decode a single document. Never fails; see [`Resource::is_identified`].
    pub fn decode(doc: &str) -> Self {
        let value: Value = match serde_yaml::from_str(doc) {
            Ok(v) => v,
            Err(e) => return Self::unidentified(doc, format!("YAML parse error: {}", e)),
        };

        let api_version = value.get("apiVersion").and_then(Value::as_str);
        let kind = value.get("kind").and_then(Value::as_str);
        let (Some(api_version), Some(kind)) = (api_version, kind) else {
            return Self {
                raw: doc.to_string(),
                gvk: None,
                metadata: ResourceMeta::default(),
                decoded: value,
                decode_error: Some("resource missing apiVersion or kind".to_string()),
            };
        };

        let gvk = Gvk::from_api_version(api_version, kind);
        let metadata = extract_meta(&value);

        Self {
            raw: doc.to_string(),
            gvk: Some(gvk),
            decoded: value,
            metadata,
            decode_error: None,
        }
    }

    fn unidentified(doc: &str, error: String) -> Self {
        Self {
            raw: doc.to_string(),
            gvk: None,
            decoded: Value::Null,
            metadata: ResourceMeta::default(),
            decode_error: Some(error),
        }
    }

    /// Whether apiVersion and kind were decoded
    pub fn is_identified(&self) -> bool {
        self.gvk.is_some()
    }

    /// Kind, or "" for unidentified resources
    pub fn kind(&self) -> &str {
        self.gvk.as_ref().map(|g| g.kind.as_str()).unwrap_or("")
    }

    /// apiVersion, or "" for unidentified resources
    pub fn api_version(&self) -> String {
        self.gvk.as_ref().map(Gvk::api_version).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.metadata.annotations
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    /// Creation phase annotation (default "0")
    pub fn creation_phase(&self) -> String {
        annotations::creation_phase(&self.metadata.annotations)
    }

    /// Deletion phase annotation (default "0")
    pub fn deletion_phase(&self) -> String {
        annotations::deletion_phase(&self.metadata.annotations)
    }

    /// Display key: `Kind/name`, or a placeholder for unidentified documents
    pub fn key(&self) -> String {
        if self.is_identified() {
            format!("{}/{}", self.kind(), self.name())
        } else {
            "<unidentified>".to_string()
        }
    }

    /// Look up a string value by nested keys in the decoded tree
    pub fn lookup_str(&self, path: &[&str]) -> Option<&str> {
        let mut current = &self.decoded;
        for key in path {
            current = current.get(*key)?;
        }
        current.as_str()
    }
}

fn extract_meta(value: &Value) -> ResourceMeta {
    let metadata = value.get("metadata");

    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .map(String::from);

    ResourceMeta {
        name,
        namespace,
        annotations: string_map(metadata.and_then(|m| m.get("annotations"))),
        labels: string_map(metadata.and_then(|m| m.get("labels"))),
    }
}

/// Tolerant string map extraction: non-string values are stringified.
fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Mapping(map)) = value else {
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(k, v)| {
            let key = k.as_str()?.to_string();
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Null => String::new(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

/// Split multi-document YAML on `---` separator lines
///
/// Empty and comment-only documents are dropped.
pub fn split_documents(manifest: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            push_document(&mut docs, &current);
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_document(&mut docs, &current);

    docs
}

fn push_document(docs: &mut Vec<String>, doc: &str) {
    let meaningful = doc
        .lines()
        .any(|l| !l.trim().is_empty() && !l.trim().starts_with('#'));
    if meaningful {
        docs.push(doc.to_string());
    }
}

/// Classify already-split documents
pub fn classify<I, S>(docs: I) -> Vec<Resource>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    docs.into_iter()
        .map(|doc| {
            let resource = Resource::decode(doc.as_ref());
            if let Some(err) = &resource.decode_error {
                debug!(error = %err, "keeping unidentified manifest document");
            }
            resource
        })
        .collect()
}

/// Split and classify a multi-document manifest
pub fn parse_manifests(manifest: &str) -> Vec<Resource> {
    classify(split_documents(manifest))
}
