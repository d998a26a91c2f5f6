//! Demo build unit: an `XExample` composes a single ClusterRole whose rules
//! are filled from the composite's parameters.

#![deny(unsafe_code)]

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use xrc_build::{export_builder, Builder, CompositionSkeleton, ObjectKindReference};
use xrc_core::{Patch, LABEL_CLAIM_NAME, LABEL_CLAIM_NAMESPACE};
use xrc_demo_apis::XExample;

#[derive(Debug, Default)]
pub struct ExampleBuilder;

impl ExampleBuilder {
    pub fn new() -> Self { Self }
}

impl Builder for ExampleBuilder {
    fn composite_type_ref(&self) -> ObjectKindReference { ObjectKindReference::of(&XExample::default()) }

    fn build(&self, c: &mut CompositionSkeleton) -> anyhow::Result<()> {
        c.with_name("example");

        let cluster_role = ClusterRole {
            rules: Some(vec![
                PolicyRule {
                    verbs: vec!["GET".into()],
                    api_groups: Some(vec!["v1".into()]),
                    // patched
                    resources: Some(vec![String::new()]),
                    ..Default::default()
                },
                PolicyRule {
                    verbs: vec!["GET".into()],
                    api_groups: Some(vec!["v1".into()]),
                    // patched
                    resource_names: Some(vec![String::new()]),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let claim_namespace = format!("metadata.labels[{LABEL_CLAIM_NAMESPACE}]");
        let claim_name = format!("metadata.labels[{LABEL_CLAIM_NAME}]");
        c.new_resource(ObjectKindReference::of(&cluster_role))
            .register_labels([LABEL_CLAIM_NAMESPACE, LABEL_CLAIM_NAME])
            .with_name("cluster-role")
            .with_patches([
                Patch::simple("spec.parameters.exampleField", "rules[0].resources[0]"),
                Patch::simple("spec.providerConfigRef.name", "rules[1].resourceNames[0]"),
                Patch::simple(claim_namespace.as_str(), claim_namespace.as_str()),
                Patch::simple(claim_name.as_str(), claim_name.as_str()),
            ]);
        Ok(())
    }
}

export_builder!(ExampleBuilder::new);
