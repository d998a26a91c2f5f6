//! Patch types shared by composed templates and patch-and-transform inputs.

use serde::{Deserialize, Serialize};

/// Patch kind. Unrecognised strings are kept verbatim in `Other` so the
/// validator can report the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatchType {
    FromCompositeFieldPath,
    ToCompositeFieldPath,
    CombineFromComposite,
    CombineToComposite,
    PatchSet,
    FromEnvironmentFieldPath,
    ToEnvironmentFieldPath,
    CombineFromEnvironment,
    CombineToEnvironment,
    Other(String),
}

impl PatchType {
    pub fn as_str(&self) -> &str {
        match self {
            PatchType::FromCompositeFieldPath => "FromCompositeFieldPath",
            PatchType::ToCompositeFieldPath => "ToCompositeFieldPath",
            PatchType::CombineFromComposite => "CombineFromComposite",
            PatchType::CombineToComposite => "CombineToComposite",
            PatchType::PatchSet => "PatchSet",
            PatchType::FromEnvironmentFieldPath => "FromEnvironmentFieldPath",
            PatchType::ToEnvironmentFieldPath => "ToEnvironmentFieldPath",
            PatchType::CombineFromEnvironment => "CombineFromEnvironment",
            PatchType::CombineToEnvironment => "CombineToEnvironment",
            PatchType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for PatchType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "FromCompositeFieldPath" => PatchType::FromCompositeFieldPath,
            "ToCompositeFieldPath" => PatchType::ToCompositeFieldPath,
            "CombineFromComposite" => PatchType::CombineFromComposite,
            "CombineToComposite" => PatchType::CombineToComposite,
            "PatchSet" => PatchType::PatchSet,
            "FromEnvironmentFieldPath" => PatchType::FromEnvironmentFieldPath,
            "ToEnvironmentFieldPath" => PatchType::ToEnvironmentFieldPath,
            "CombineFromEnvironment" => PatchType::CombineFromEnvironment,
            "CombineToEnvironment" => PatchType::CombineToEnvironment,
            _ => PatchType::Other(s),
        }
    }
}

impl From<&str> for PatchType {
    fn from(s: &str) -> Self { PatchType::from(s.to_string()) }
}

impl From<PatchType> for String {
    fn from(t: PatchType) -> Self {
        match t {
            PatchType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for PatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CombineStrategy {
    String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CombineVariable {
    pub from_field_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Combine {
    pub variables: Vec<CombineVariable>,
    pub strategy: CombineStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<serde_json::Value>,
}

impl Combine {
    /// `string` strategy combine using a `fmt` format string, e.g. `"%s-%s"`.
    pub fn string_format<I, S>(from_field_paths: I, fmt: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: from_field_paths.into_iter().map(|p| CombineVariable { from_field_path: p.into() }).collect(),
            strategy: CombineStrategy::String,
            string: Some(serde_json::json!({ "fmt": fmt })),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatchPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine: Option<Combine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PatchPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_set_name: Option<String>,
}

/// Patch-and-transform function inputs use the same wire shape.
pub type ComposedPatch = Patch;

impl Patch {
    /// Patch with no explicit type; treated as `FromCompositeFieldPath`.
    pub fn simple(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from_field_path: Some(from.into()), to_field_path: Some(to.into()), ..Default::default() }
    }

    pub fn from_composite(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { patch_type: Some(PatchType::FromCompositeFieldPath), ..Self::simple(from, to) }
    }

    /// Note the argument order: destination on the composite first.
    pub fn to_composite(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self { patch_type: Some(PatchType::ToCompositeFieldPath), ..Self::simple(from, to) }
    }

    pub fn combine_from_composite(combine: Combine, to: impl Into<String>) -> Self {
        Self {
            patch_type: Some(PatchType::CombineFromComposite),
            to_field_path: Some(to.into()),
            combine: Some(combine),
            ..Default::default()
        }
    }

    pub fn combine_to_composite(combine: Combine, to: impl Into<String>) -> Self {
        Self { patch_type: Some(PatchType::CombineToComposite), ..Self::combine_from_composite(combine, to) }
    }

    /// Sets the `MergeObjects` policy on the destination field.
    pub fn merge_objects(mut self) -> Self {
        self.policy = Some(PatchPolicy { to_field_path: Some("MergeObjects".to_string()), ..Default::default() });
        self
    }

    pub fn with_transform(mut self, transform: serde_json::Value) -> Self {
        self.transforms.push(transform);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_patch_type_keeps_its_value() {
        let p: Patch = serde_json::from_value(serde_json::json!({ "type": "FromSomewhereElse", "fromFieldPath": "spec.a" })).unwrap();
        assert_eq!(p.patch_type, Some(PatchType::Other("FromSomewhereElse".into())));
        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["type"], "FromSomewhereElse");
    }

    #[test]
    fn helpers_set_type_and_direction() {
        let to = Patch::to_composite("status.ready", "status.atProvider.ready");
        assert_eq!(to.patch_type, Some(PatchType::ToCompositeFieldPath));
        assert_eq!(to.from_field_path.as_deref(), Some("status.atProvider.ready"));
        assert_eq!(to.to_field_path.as_deref(), Some("status.ready"));

        let merged = Patch::from_composite("spec.labels", "metadata.labels").merge_objects();
        let v = serde_json::to_value(&merged).unwrap();
        assert_eq!(v["policy"]["toFieldPath"], "MergeObjects");

        let combined = Patch::combine_from_composite(Combine::string_format(["spec.a", "spec.b"], "%s-%s"), "metadata.name");
        let v = serde_json::to_value(&combined).unwrap();
        assert_eq!(v["combine"]["strategy"], "string");
        assert_eq!(v["combine"]["variables"][1]["fromFieldPath"], "spec.b");
        assert_eq!(v["combine"]["string"]["fmt"], "%s-%s");
    }
}
