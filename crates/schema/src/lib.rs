//! xrc schema: field paths and their structural resolution against JSON schemas.
//!
//! Builders describe objects with ordinary Rust types. Their `schemars` schema
//! (k8s-openapi and kube's `CustomResource` derive both provide one) is the
//! source of truth for which patch paths exist on an object.

#![forbid(unsafe_code)]

use schemars::{gen::SchemaGenerator, JsonSchema};
use serde_json::{json, Map, Value};
use tracing::debug;

mod path;

pub use path::{FieldPath, ParseError, PathSet, Segment};

/// Nesting limit for schema walks; also breaks `$ref` cycles.
const MAX_DEPTH: usize = 64;

/// Answers whether a field path exists on an object's structure.
pub trait ResolvesPath {
    fn resolves_path(&self, segments: &[Segment]) -> bool;
}

/// A JSON schema document used for path resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    root: Value,
}

impl ObjectSchema {
    /// Schema generated from a Rust type's `JsonSchema` impl.
    pub fn for_type<T: JsonSchema>() -> Self {
        let root = SchemaGenerator::default().into_root_schema_for::<T>();
        Self::from_json_schema(serde_json::to_value(root).unwrap_or_default())
    }

    pub fn from_json_schema(root: Value) -> Self { Self { root } }

    /// Schema inferred from an instance's own shape. Every key present on the
    /// instance becomes a property; arrays take the shape of their first item.
    pub fn infer(instance: &Value) -> Self { Self { root: infer_node(instance) } }

    pub fn as_json(&self) -> &Value { &self.root }

    pub fn resolves(&self, path: &FieldPath) -> bool { self.resolves_path(path.segments()) }

    fn lookup(&self, reference: &str) -> Option<&Value> {
        let found = reference.strip_prefix('#').and_then(|pointer| self.root.pointer(pointer));
        if found.is_none() {
            debug!(reference, "schema reference not found");
        }
        found
    }

    fn walk(&self, node: &Value, segments: &[Segment], depth: usize) -> bool {
        if segments.is_empty() { return true; }
        if depth > MAX_DEPTH { return false; }
        // `true` schemas (arbitrary JSON) are opaque
        let Some(obj) = node.as_object() else { return false };

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            return self.lookup(reference).map_or(false, |target| self.walk(target, segments, depth + 1));
        }
        for combinator in ["allOf", "anyOf", "oneOf"] {
            if let Some(alternatives) = obj.get(combinator).and_then(Value::as_array) {
                if alternatives.iter().any(|alt| self.walk(alt, segments, depth + 1)) {
                    return true;
                }
            }
        }

        let (head, rest) = (&segments[0], &segments[1..]);
        match head {
            Segment::Field(name) | Segment::Key(name) => obj
                .get("properties")
                .and_then(|props| props.get(name.as_str()))
                .map_or(false, |child| self.walk(child, rest, depth + 1)),
            Segment::Index(idx) => match obj.get("items") {
                Some(Value::Array(tuple)) => tuple.get(*idx).map_or(false, |child| self.walk(child, rest, depth + 1)),
                Some(items) => self.walk(items, rest, depth + 1),
                None => false,
            },
        }
    }
}

impl ResolvesPath for ObjectSchema {
    fn resolves_path(&self, segments: &[Segment]) -> bool { self.walk(&self.root, segments, 0) }
}

fn infer_node(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let props: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), infer_node(v))).collect();
            json!({ "type": "object", "properties": props })
        }
        Value::Array(items) => match items.first() {
            Some(first) => json!({ "type": "array", "items": infer_node(first) }),
            None => json!({ "type": "array" }),
        },
        Value::String(_) => json!({ "type": "string" }),
        Value::Number(n) if n.is_f64() => json!({ "type": "number" }),
        Value::Number(_) => json!({ "type": "integer" }),
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Null => json!({}),
    }
}
