//! Field paths
//!
//! A rule's `whenFieldPath` (`api.version`, `steps.0`) is parsed once into a
//! sequence of typed segments, checked against the schema of the rule's kind,
//! and then only ever walked against documents. Nothing is evaluated.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPathSegment {
    /// A named field in an object
    Field(String),
    /// An array index
    Index(usize),
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{}", name),
            Self::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Parsed, schema-checked path from a document root to a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<FieldPathSegment>,
}

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<index>0|[1-9][0-9]*)|(?P<field>[A-Za-z_][A-Za-z0-9_-]*))$")
            .expect("segment pattern is a valid regex")
    })
}

impl FieldPath {
    /// Parse a dotted accessor
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Err("field path is empty".to_string());
        }

        let segments = raw
            .split('.')
            .map(|part| {
                let caps = segment_pattern()
                    .captures(part)
                    .ok_or_else(|| format!("malformed segment '{}' in field path '{}'", part, raw))?;
                if let Some(index) = caps.name("index") {
                    index
                        .as_str()
                        .parse()
                        .map(FieldPathSegment::Index)
                        .map_err(|e| format!("bad index '{}' in field path '{}': {}", part, raw, e))
                } else {
                    Ok(FieldPathSegment::Field(part.to_string()))
                }
            })
            .collect::<Result<Vec<_>, String>>()?;

        if matches!(segments.first(), Some(FieldPathSegment::Index(_))) {
            return Err(format!("field path '{}' must start with a field name", raw));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[FieldPathSegment] {
        &self.segments
    }

    /// Value at this path, if every segment resolves
    pub fn resolve<'v>(&self, document: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(document, |value, segment| match segment {
            FieldPathSegment::Field(name) => value.as_object()?.get(name),
            FieldPathSegment::Index(i) => value.as_array()?.get(*i),
        })
    }

    /// Check that every segment is declared by `schema`.
    ///
    /// Local `#/definitions/...` references are followed. A schema node that
    /// declares no structure at all (no `properties`, `items`, `$ref` or
    /// composition) accepts any remaining path.
    pub fn check_against(&self, schema: &Value) -> Result<(), String> {
        let mut nodes = vec![schema];
        for (i, segment) in self.segments.iter().enumerate() {
            let mut next = Vec::new();
            let mut open = false;
            for node in expand(schema, &nodes) {
                if is_unconstrained(node) {
                    open = true;
                    continue;
                }
                match segment {
                    FieldPathSegment::Field(name) => {
                        if let Some(prop) = node.get("properties").and_then(|p| p.get(name)) {
                            next.push(prop);
                        } else if let Some(extra) = node.get("additionalProperties").filter(|v| v.is_object()) {
                            next.push(extra);
                        }
                    }
                    FieldPathSegment::Index(idx) => match node.get("items") {
                        Some(Value::Array(tuple)) => next.extend(tuple.get(*idx)),
                        Some(items) if items.is_object() || items.is_boolean() => next.push(items),
                        _ => {}
                    },
                }
            }

            if open {
                return Ok(());
            }
            if next.is_empty() {
                let prefix: String = self.segments[..i].iter().map(|s| s.to_string()).collect();
                return Err(format!(
                    "'{}' is not declared at '{}'",
                    segment.to_string().trim_start_matches('.'),
                    if prefix.is_empty() { "<root>".to_string() } else { prefix }
                ));
            }
            nodes = next;
        }
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Follow local refs and flatten allOf/anyOf/oneOf
fn expand<'s>(root: &'s Value, nodes: &[&'s Value]) -> Vec<&'s Value> {
    let mut out = Vec::new();
    let mut pending: Vec<&Value> = nodes.to_vec();
    let mut guard = 0;
    while let Some(node) = pending.pop() {
        guard += 1;
        if guard > 256 {
            break;
        }
        if let Some(target) = node
            .get("$ref")
            .and_then(|r| r.as_str())
            .and_then(|r| r.strip_prefix('#'))
            .and_then(|pointer| root.pointer(pointer))
        {
            pending.push(target);
        }
        for key in ["allOf", "anyOf", "oneOf"] {
            if let Some(branches) = node.get(key).and_then(|b| b.as_array()) {
                pending.extend(branches.iter());
            }
        }
        out.push(node);
    }
    out
}

/// No declared structure, and not typed as a scalar
fn is_unconstrained(node: &Value) -> bool {
    match node {
        Value::Bool(b) => *b,
        Value::Object(map) => {
            let structural = ["properties", "additionalProperties", "items", "$ref", "allOf", "anyOf", "oneOf"]
                .iter()
                .any(|k| map.contains_key(*k));
            let container = match map.get("type") {
                None => !map.contains_key("enum") && !map.contains_key("const"),
                Some(Value::String(t)) => t == "object" || t == "array",
                Some(Value::Array(types)) => types.iter().any(|t| t == "object" || t == "array"),
                Some(_) => false,
            };
            !structural && container
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = FieldPath::parse("steps.0.title").unwrap();
        assert_eq!(
            path.segments(),
            &[
                FieldPathSegment::Field("steps".into()),
                FieldPathSegment::Index(0),
                FieldPathSegment::Field("title".into()),
            ]
        );
        assert_eq!(path.to_string(), "steps.0.title");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("api..version").is_err());
        assert!(FieldPath::parse("api.version()").is_err());
        assert!(FieldPath::parse("0.name").is_err());
        assert!(FieldPath::parse("steps.01").is_err());
    }

    #[test]
    fn test_resolve() {
        let doc = json!({ "api": { "version": "2.0.0" }, "steps": ["a", "b"] });
        assert_eq!(FieldPath::parse("api.version").unwrap().resolve(&doc), Some(&json!("2.0.0")));
        assert_eq!(FieldPath::parse("steps.1").unwrap().resolve(&doc), Some(&json!("b")));
        assert_eq!(FieldPath::parse("steps.5").unwrap().resolve(&doc), None);
        assert_eq!(FieldPath::parse("api.version.major").unwrap().resolve(&doc), None);
    }

    #[test]
    fn test_check_against_follows_refs() {
        let schema = json!({
            "type": "object",
            "definitions": {
                "api": { "type": "object", "properties": { "version": { "type": "string" } } }
            },
            "properties": {
                "api": { "$ref": "#/definitions/api" },
                "steps": { "type": "array", "items": { "type": "string" } },
                "exports": { "type": "object", "additionalProperties": { "type": "string" } }
            }
        });

        assert!(FieldPath::parse("api.version").unwrap().check_against(&schema).is_ok());
        assert!(FieldPath::parse("steps.0").unwrap().check_against(&schema).is_ok());
        assert!(FieldPath::parse("exports.anything").unwrap().check_against(&schema).is_ok());

        let err = FieldPath::parse("api.basePath").unwrap().check_against(&schema).unwrap_err();
        assert_eq!(err, "'basePath' is not declared at '.api'");
        assert!(FieldPath::parse("owner").unwrap().check_against(&schema).is_err());
        assert!(FieldPath::parse("api.0").unwrap().check_against(&schema).is_err());
    }

    #[test]
    fn test_unconstrained_schema_accepts_any_path() {
        let schema = json!({ "required": ["id"] });
        assert!(FieldPath::parse("anything.at.all").unwrap().check_against(&schema).is_ok());
    }
}
