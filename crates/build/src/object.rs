use std::fmt;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::GroupVersionKind;
use schemars::{gen::SchemaGenerator, JsonSchema};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use xrc_core::{api_version, gvk_key};
use xrc_schema::{FieldPath, ObjectSchema, ResolvesPath};

/// A typed object tag plus an instance of it.
///
/// The instance is written out as a composed template base or pipeline input;
/// the schema decides which patch paths exist on it.
#[derive(Clone)]
pub struct ObjectKindReference {
    pub gvk: GroupVersionKind,
    pub object: Value,
    schema: Arc<dyn ResolvesPath + Send + Sync>,
}

impl ObjectKindReference {
    /// Reference for any Kubernetes resource type with a generated schema.
    pub fn of<K>(object: &K) -> Self
    where
        K: kube::Resource<DynamicType = ()> + Serialize + JsonSchema,
    {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        let value = to_value_or_null(&gvk, object);
        Self { gvk, object: value, schema: Arc::new(resource_schema::<K>()) }
    }

    pub fn new<T: Serialize + JsonSchema>(gvk: GroupVersionKind, object: &T) -> Self {
        let value = to_value_or_null(&gvk, object);
        Self { gvk, object: value, schema: Arc::new(ObjectSchema::for_type::<T>()) }
    }

    /// Untyped object; its schema is inferred from the value itself.
    pub fn from_value(gvk: GroupVersionKind, object: Value) -> Self {
        let schema = ObjectSchema::infer(&object);
        Self { gvk, object, schema: Arc::new(schema) }
    }

    pub fn with_schema(gvk: GroupVersionKind, object: Value, schema: impl ResolvesPath + Send + Sync + 'static) -> Self {
        Self { gvk, object, schema: Arc::new(schema) }
    }

    pub fn resolves(&self, path: &FieldPath) -> bool { self.schema.resolves_path(path.segments()) }

    pub fn kind_key(&self) -> String { gvk_key(&self.gvk) }

    /// The instance with `apiVersion`/`kind` set from the GVK.
    pub(crate) fn stamped(&self) -> Value {
        let mut object = self.object.clone();
        if let Value::Object(map) = &mut object {
            map.insert("apiVersion".into(), Value::String(api_version(&self.gvk)));
            map.insert("kind".into(), Value::String(self.gvk.kind.clone()));
        }
        object
    }

    /// The instance with `apiVersion`/`kind` filled only where absent.
    pub(crate) fn with_type_meta(&self) -> Value {
        let mut object = self.object.clone();
        if self.gvk.kind.is_empty() { return object; }
        if let Value::Object(map) = &mut object {
            map.entry("apiVersion").or_insert_with(|| Value::String(api_version(&self.gvk)));
            map.entry("kind").or_insert_with(|| Value::String(self.gvk.kind.clone()));
        }
        object
    }
}

fn to_value_or_null<T: Serialize>(gvk: &GroupVersionKind, object: &T) -> Value {
    serde_json::to_value(object).unwrap_or_else(|e| {
        warn!(gvk = %gvk_key(gvk), error = %e, "object did not serialize; using null");
        Value::Null
    })
}

/// Schema of a resource type with `metadata` guaranteed to be `ObjectMeta`.
/// Derived custom resources leave it out of their own schema.
fn resource_schema<K: JsonSchema>() -> ObjectSchema {
    let mut gen = SchemaGenerator::default();
    let meta = gen.subschema_for::<ObjectMeta>();
    let mut root = gen.into_root_schema_for::<K>();
    root.schema.object().properties.entry("metadata".to_string()).or_insert(meta);
    ObjectSchema::from_json_schema(serde_json::to_value(root).unwrap_or_default())
}

impl fmt::Debug for ObjectKindReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectKindReference").field("gvk", &self.kind_key()).field("object", &self.object).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::rbac::v1::ClusterRole;
    use serde_json::json;

    #[test]
    fn typed_reference_uses_resource_gvk() {
        let r = ObjectKindReference::of(&ClusterRole::default());
        assert_eq!(r.kind_key(), "rbac.authorization.k8s.io/v1/ClusterRole");
        let stamped = r.stamped();
        assert_eq!(stamped["apiVersion"], "rbac.authorization.k8s.io/v1");
        assert_eq!(stamped["kind"], "ClusterRole");
        assert!(r.resolves(&FieldPath::parse("rules[0].verbs[0]").unwrap()));
    }

    #[test]
    fn type_meta_is_only_filled_when_missing() {
        let gvk = GroupVersionKind::gvk("pt.crossplane.io", "v1beta1", "Resources");
        let r = ObjectKindReference::from_value(gvk, json!({ "kind": "Custom", "resources": [] }));
        let v = r.with_type_meta();
        assert_eq!(v["kind"], "Custom");
        assert_eq!(v["apiVersion"], "pt.crossplane.io/v1beta1");

        let untyped = ObjectKindReference::from_value(GroupVersionKind::gvk("", "", ""), json!({ "a": 1 }));
        assert_eq!(untyped.with_type_meta(), json!({ "a": 1 }));
    }
}
