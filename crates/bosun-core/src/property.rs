//! Dotted property paths for `wait-for-properties`
//!
//! Paths look like `.status.phase` or `.status.conditions[0].type`.
//! A malformed path is a configuration error, never a retryable condition.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
}

/// A parsed property path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    raw: String,
    segments: Vec<Segment>,
}

impl PropertyPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidPropertyPath {
            path: path.to_string(),
            message: message.to_string(),
        };

        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        let mut chars = trimmed.chars().peekable();
        // A leading dot is optional
        if chars.peek() == Some(&'.') {
            chars.next();
        }

        let mut field = String::new();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if field.is_empty() {
                        if matches!(segments.last(), Some(Segment::Index(_))) {
                            continue;
                        }
                        return Err(invalid("empty field name"));
                    }
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                }
                '[' => {
                    if !field.is_empty() {
                        segments.push(Segment::Field(std::mem::take(&mut field)));
                    } else if segments.is_empty() {
                        return Err(invalid("index without a field"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid("unclosed '['")),
                        }
                    }
                    let index = digits
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid("index must be a non-negative integer"))?;
                    segments.push(Segment::Index(index));
                }
                ']' => return Err(invalid("unexpected ']'")),
                c if c.is_whitespace() => return Err(invalid("whitespace in path")),
                c => field.push(c),
            }
        }

        if !field.is_empty() {
            segments.push(Segment::Field(field));
        } else if !matches!(segments.last(), Some(Segment::Index(_))) {
            return Err(invalid("path ends with '.'"));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// Resolve the path in a JSON object
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Field(name) => current.get(name.as_str()),
                Segment::Index(i) => current.get(*i),
            })
    }

    /// Whether the value at the path renders to `expected`
    pub fn matches(&self, value: &Value, expected: &str) -> bool {
        self.lookup(value)
            .is_some_and(|found| render(found) == expected)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl FromStr for PropertyPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object() -> Value {
        json!({
            "status": {
                "phase": "Running",
                "readyReplicas": 3,
                "ready": true,
                "conditions": [
                    {"type": "Available", "status": "True"},
                    {"type": "Progressing", "status": "False"}
                ]
            }
        })
    }

    #[test]
    fn test_simple_path() {
        let path = PropertyPath::parse(".status.phase").unwrap();
        assert!(path.matches(&object(), "Running"));
        assert!(!path.matches(&object(), "Pending"));
    }

    #[test]
    fn test_leading_dot_is_optional() {
        let path = PropertyPath::parse("status.phase").unwrap();
        assert!(path.matches(&object(), "Running"));
    }

    #[test]
    fn test_indexed_path() {
        let path = PropertyPath::parse(".status.conditions[1].status").unwrap();
        assert!(path.matches(&object(), "False"));

        let path = PropertyPath::parse(".status.conditions[5].status").unwrap();
        assert!(!path.matches(&object(), "False"));
    }

    #[test]
    fn test_non_string_values_compare_rendered() {
        let replicas = PropertyPath::parse(".status.readyReplicas").unwrap();
        assert!(replicas.matches(&object(), "3"));

        let ready = PropertyPath::parse(".status.ready").unwrap();
        assert!(ready.matches(&object(), "true"));
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let path = PropertyPath::parse(".status.nothing").unwrap();
        assert!(path.lookup(&object()).is_none());
        assert!(!path.matches(&object(), ""));
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["", "  ", ".", "..a", ".a..b", ".a.", ".a[x]", ".a[1", ".a]", "[0]", ".a b"] {
            assert!(PropertyPath::parse(bad).is_err(), "{:?} should fail", bad);
        }
    }
}
