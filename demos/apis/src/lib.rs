//! Demo composite API: `XExample` in `example.crossbuilder.io/v1alpha1`.

#![forbid(unsafe_code)]

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "example.crossbuilder.io";
pub const VERSION: &str = "v1alpha1";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(group = "example.crossbuilder.io", version = "v1alpha1", kind = "XExample", derive = "Default", derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct XExampleSpec {
    #[serde(default)]
    pub parameters: XExampleParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config_ref: Option<ProviderConfigReference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct XExampleParameters {
    #[serde(default)]
    pub example_field: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ProviderConfigReference {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn gvk_matches_constants() {
        assert_eq!(XExample::group(&()), GROUP);
        assert_eq!(XExample::version(&()), VERSION);
        assert_eq!(XExample::kind(&()), "XExample");
    }
}
