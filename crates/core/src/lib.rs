//! xrc core types: the Composition API surface written by the generator.
//!
//! Mirrors the subset of `apiextensions.crossplane.io/v1` that builders can
//! produce. Everything serializes with the upstream camelCase field names so
//! the generated YAML can be applied as-is.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

pub mod patch;

pub use patch::{Combine, CombineStrategy, CombineVariable, ComposedPatch, Patch, PatchPolicy, PatchType};

pub const API_VERSION: &str = "apiextensions.crossplane.io/v1";
pub const COMPOSITION_KIND: &str = "Composition";

pub const LABEL_CLAIM_NAME: &str = "crossplane.io/claim-name";
pub const LABEL_CLAIM_NAMESPACE: &str = "crossplane.io/claim-namespace";

pub const ANNOTATION_EXTERNAL_NAME: &str = "crossplane.io/external-name";
pub const ANNOTATION_EXTERNAL_CREATE_PENDING: &str = "crossplane.io/external-create-pending";
pub const ANNOTATION_EXTERNAL_CREATE_SUCCEEDED: &str = "crossplane.io/external-create-succeeded";
pub const ANNOTATION_EXTERNAL_CREATE_FAILED: &str = "crossplane.io/external-create-failed";

/// Composite annotations registered as safe patch paths on every composition.
pub const KNOWN_COMPOSITE_ANNOTATIONS: &[&str] = &[];

/// Composite labels registered as safe patch paths on every composition.
pub const KNOWN_COMPOSITE_LABELS: &[&str] = &[LABEL_CLAIM_NAME, LABEL_CLAIM_NAMESPACE];

/// Resource annotations registered as safe patch paths on every composed template.
pub const KNOWN_RESOURCE_ANNOTATIONS: &[&str] = &[
    ANNOTATION_EXTERNAL_NAME,
    ANNOTATION_EXTERNAL_CREATE_PENDING,
    ANNOTATION_EXTERNAL_CREATE_SUCCEEDED,
    ANNOTATION_EXTERNAL_CREATE_FAILED,
];

/// Resource labels registered as safe patch paths on every composed template.
pub const KNOWN_RESOURCE_LABELS: &[&str] = &[];

/// `group/version/Kind` key (or `version/Kind` for the core group), as used in logs.
pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

/// `apiVersion` string for a GVK (`group/version`, or bare `version` for core).
pub fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() { gvk.version.clone() } else { format!("{}/{}", gvk.group, gvk.version) }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompositionMode {
    #[default]
    Resources,
    Pipeline,
}

impl std::fmt::Display for CompositionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositionMode::Resources => f.write_str("Resources"),
            CompositionMode::Pipeline => f.write_str("Pipeline"),
        }
    }
}

/// The finished document written for each builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: CompositionSpec,
}

impl Composition {
    pub fn new(name: impl Into<String>, spec: CompositionSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: COMPOSITION_KIND.to_string(),
            metadata: ObjectMeta { name: Some(name.into()), ..Default::default() },
            spec,
        }
    }

    pub fn name(&self) -> &str { self.metadata.name.as_deref().unwrap_or("") }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    pub composite_type_ref: TypeReference,
    pub mode: CompositionMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ComposedTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<PipelineStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secrets_to_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_connection_details_with_store_config_ref: Option<StoreConfigReference>,
}

/// Reference to the composite type a composition is defined for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub api_version: String,
    pub kind: String,
}

impl TypeReference {
    pub fn to(gvk: &GroupVersionKind) -> Self {
        Self { api_version: api_version(gvk), kind: gvk.kind.clone() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfigReference {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub base: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_details: Vec<ConnectionDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_checks: Vec<ReadinessCheck>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionDetailType {
    FromConnectionSecretKey,
    FromFieldPath,
    FromValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub detail_type: Option<ConnectionDetailType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_connection_secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReadinessCheckType {
    NonEmpty,
    MatchString,
    MatchInteger,
    MatchTrue,
    MatchFalse,
    MatchCondition,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchConditionReadinessCheck {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessCheck {
    #[serde(rename = "type")]
    pub check_type: ReadinessCheckType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_integer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_condition: Option<MatchConditionReadinessCheck>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionReference {
    pub name: String,
}

impl FunctionReference {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub step: String,
    pub function_ref: FunctionReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// Label/annotation map as carried by `ObjectMeta`.
pub type StringMap = BTreeMap<String, String>;

/// Renders an error followed by each of its sources, `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
