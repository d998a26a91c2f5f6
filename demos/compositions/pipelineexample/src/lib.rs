//! Demo build unit: a two step function pipeline. The first step renders the
//! bundled go templates, the second patches an `XExample` through
//! patch-and-transform.

#![deny(unsafe_code)]

use anyhow::Context;
use kube::core::GroupVersionKind;
use serde_json::json;
use xrc_build::{export_builder, load_template, template_path, Builder, CompositionSkeleton, ObjectKindReference};
use xrc_core::{CompositionMode, FunctionReference, Patch};
use xrc_demo_apis::{XExample, XExampleSpec};

#[derive(Debug, Default)]
pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn new() -> Self { Self }
}

impl Builder for PipelineBuilder {
    fn composite_type_ref(&self) -> ObjectKindReference { ObjectKindReference::of(&XExample::default()) }

    fn build(&self, c: &mut CompositionSkeleton) -> anyhow::Result<()> {
        c.with_name("pipelineexample").with_mode(CompositionMode::Pipeline).with_labels([("example", "pipeline")]);

        let templates = template_path!("templates/*");
        let template = load_template(&templates).with_context(|| format!("loading templates from {templates}"))?;

        c.new_pipeline_step("test-step")
            .with_function_ref(FunctionReference::new("function-go-templating"))
            .with_input(ObjectKindReference::from_value(
                GroupVersionKind::gvk("gotemplating.fn.crossplane.io", "v1beta1", "GoTemplate"),
                json!({ "source": "Inline", "inline": { "template": template } }),
            ))
            .with_patches(
                "resource-1",
                [
                    Patch::from_composite("spec.containers[0].image", "spec.containers[0].image"),
                    Patch::from_composite("metadata.labels[app]", "metadata.labels[app]"),
                ],
            );

        let base = serde_json::to_value(XExample::new("", XExampleSpec::default())).context("serializing XExample base")?;
        c.new_pipeline_step("test-step-2")
            .with_function_ref(FunctionReference::new("function-patch-and-transform"))
            .with_input(ObjectKindReference::from_value(
                GroupVersionKind::gvk("pt.crossplane.io", "v1beta1", "Resources"),
                json!({ "resources": [{ "name": "resource-2", "base": base }] }),
            ))
            .merge_patches_into_input(true)
            .with_patches(
                "resource-2",
                [
                    Patch::from_composite("status.atProvider.something", "spec.forProvider.something"),
                    Patch::from_composite("metadata.labels[app]", "spec.forProvider.labels[app]"),
                ],
            );
        Ok(())
    }
}

export_builder!(PipelineBuilder::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_render_in_order() {
        let builder = (XRC_BUILDER.create)();
        let mut c = CompositionSkeleton::new(builder.composite_type_ref());
        builder.build(&mut c).unwrap();
        let comp = c.finalize().unwrap();

        assert_eq!(comp.name(), "pipelineexample");
        assert_eq!(comp.spec.mode, CompositionMode::Pipeline);
        assert!(comp.spec.resources.is_empty());
        let [templating, patching] = comp.spec.pipeline.as_slice() else { panic!("expected two steps") };

        assert_eq!(templating.function_ref.name, "function-go-templating");
        let input = templating.input.as_ref().unwrap();
        assert_eq!(input["kind"], "GoTemplate");
        assert!(input["inline"]["template"].as_str().unwrap().starts_with("apiVersion: v1\nkind: ConfigMap"));

        assert_eq!(patching.step, "test-step-2");
        let resource = &patching.input.as_ref().unwrap()["resources"][0];
        assert_eq!(resource["base"]["kind"], "XExample");
        assert_eq!(resource["patches"][1]["toFieldPath"], "spec.forProvider.labels[app]");
    }
}
