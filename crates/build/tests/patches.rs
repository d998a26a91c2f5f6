#![forbid(unsafe_code)]

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;
use xrc_build::{validate_patch, BuildError, CompositionSkeleton, FieldPathError, ObjectKindReference, PatchError};
use xrc_core::{Combine, Patch, PatchType};
use xrc_demo_apis::XExample;
use xrc_schema::PathSet;

fn composite() -> ObjectKindReference { ObjectKindReference::of(&XExample::default()) }

fn config_map() -> ObjectKindReference { ObjectKindReference::of(&ConfigMap::default()) }

fn none() -> PathSet { PathSet::default() }

fn finalize_with(patch: Patch, register: &[&str]) -> Result<(), BuildError> {
    let mut c = CompositionSkeleton::new(composite());
    c.with_name("t");
    c.new_resource(config_map()).register_field_paths(register.iter().copied()).with_patches([patch]);
    c.finalize().map(|_| ())
}

fn patch_error(err: BuildError) -> PatchError {
    match err {
        BuildError::ComposedTemplate { source, .. } => match *source {
            BuildError::InvalidPatch { source, .. } => source,
            other => panic!("unexpected inner error: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_paths_validate_in_both_directions() {
    let from = Patch::from_composite("spec.parameters.exampleField", "data[key]");
    assert!(matches!(
        validate_patch(&from, &composite(), &config_map(), &none(), &none()),
        Err(PatchError::ToFieldPath(FieldPathError::Unresolved { .. }))
    ));
    let from = Patch::from_composite("spec.parameters.exampleField", "metadata.name");
    validate_patch(&from, &composite(), &config_map(), &none(), &none()).unwrap();

    let to = Patch::to_composite("spec.parameters.exampleField", "metadata.namespace");
    validate_patch(&to, &composite(), &config_map(), &none(), &none()).unwrap();
    let backwards = Patch::to_composite("metadata.namespace", "spec.parameters.exampleField");
    assert!(matches!(
        validate_patch(&backwards, &composite(), &config_map(), &none(), &none()),
        Err(PatchError::FromFieldPath(_))
    ));
}

#[test]
fn registered_path_round_trip() {
    let patch = Patch::simple("spec.parameters.exampleField", "data[key]");
    assert!(finalize_with(patch.clone(), &[]).is_err());
    finalize_with(patch.clone(), &["data[key]"]).unwrap();
    // dotted and bracketed spellings address the same member
    finalize_with(patch, &["data.key"]).unwrap();
}

#[test]
fn unregistered_map_key_is_rejected() {
    let err = finalize_with(Patch::simple("spec.parameters.exampleField", "metadata.labels[team]"), &[]).unwrap_err();
    match patch_error(err) {
        PatchError::ToFieldPath(FieldPathError::Unresolved { path, kind }) => {
            assert_eq!(path, "metadata.labels[team]");
            assert_eq!(kind, "v1/ConfigMap");
        }
        other => panic!("unexpected patch error: {other}"),
    }
}

#[test]
fn unsafe_patches_bypass_validation() {
    let mut c = CompositionSkeleton::new(composite());
    c.with_name("unsafe");
    c.new_resource(config_map()).with_unsafe_patches([
        Patch::simple("spec.does.not.exist", "nowhere[at][all]"),
        Patch { patch_type: Some(PatchType::from("Bogus")), ..Default::default() },
    ]);
    let comp = c.finalize().unwrap();
    let patches = &comp.spec.resources[0].patches;
    assert_eq!(patches.len(), 2);
    // unvalidated patches are written exactly as given
    assert_eq!(patches[0].patch_type, None);
}

#[test]
fn default_labels_and_annotations_need_no_registration() {
    finalize_with(
        Patch::simple("metadata.labels[crossplane.io/claim-name]", "metadata.annotations[crossplane.io/external-name]"),
        &[],
    )
    .unwrap();
    finalize_with(
        Patch::simple("metadata.labels[crossplane.io/claim-namespace]", "metadata.annotations[crossplane.io/external-create-pending]"),
        &[],
    )
    .unwrap();
}

#[test]
fn registered_composite_labels_are_accepted() {
    let mut c = CompositionSkeleton::new(composite());
    c.with_name("labels").register_composite_labels(["team"]).register_composite_annotations(["owner"]);
    c.new_resource(config_map()).register_labels(["team"]).with_patches([
        Patch::simple("metadata.labels[team]", "metadata.labels[team]"),
        Patch::simple("metadata.annotations[owner]", "metadata.name"),
    ]);
    c.finalize().unwrap();
}

#[test]
fn missing_to_field_path_defaults_to_from() {
    let patch = Patch { from_field_path: Some("metadata.name".into()), ..Default::default() };
    finalize_with(patch, &[]).unwrap();
    let patch = Patch { from_field_path: Some("spec.parameters.exampleField".into()), ..Default::default() };
    assert!(matches!(patch_error(finalize_with(patch, &[]).unwrap_err()), PatchError::ToFieldPath(_)));
}

#[test]
fn missing_from_field_path_is_reported() {
    let patch = Patch { to_field_path: Some("metadata.name".into()), ..Default::default() };
    assert!(matches!(patch_error(finalize_with(patch, &[]).unwrap_err()), PatchError::MissingField("fromFieldPath")));
}

#[test]
fn combine_requires_variables_regardless_of_paths() {
    let empty = Combine::string_format(Vec::<String>::new(), "%s");
    for to in ["metadata.name", "no.such.path"] {
        let patch = Patch::combine_from_composite(empty.clone(), to);
        assert!(matches!(
            validate_patch(&patch, &composite(), &config_map(), &none(), &none()),
            Err(PatchError::NoVariables)
        ));
    }
    let patch = Patch { patch_type: Some(PatchType::CombineToComposite), ..Default::default() };
    assert!(matches!(
        validate_patch(&patch, &composite(), &config_map(), &none(), &none()),
        Err(PatchError::MissingField("combine"))
    ));
}

#[test]
fn combine_validates_each_variable_and_destination() {
    let combine = Combine::string_format(["spec.parameters.exampleField", "spec.nope"], "%s-%s");
    let patch = Patch::combine_from_composite(combine, "metadata.name");
    assert!(matches!(
        validate_patch(&patch, &composite(), &config_map(), &none(), &none()),
        Err(PatchError::CombineVariable { index: 1, .. })
    ));

    let combine = Combine::string_format(["metadata.name", "metadata.namespace"], "%s/%s");
    let patch = Patch::combine_to_composite(combine, "spec.parameters.exampleField");
    validate_patch(&patch, &composite(), &config_map(), &none(), &none()).unwrap();

    let mut patch = Patch::combine_from_composite(Combine::string_format(["spec.parameters.exampleField"], "%s"), "x");
    patch.to_field_path = None;
    assert!(matches!(
        validate_patch(&patch, &composite(), &config_map(), &none(), &none()),
        Err(PatchError::MissingField("toFieldPath"))
    ));
}

#[test]
fn unsupported_and_unknown_types() {
    for kind in [PatchType::PatchSet, PatchType::FromEnvironmentFieldPath, PatchType::CombineToEnvironment] {
        let patch = Patch { patch_type: Some(kind.clone()), ..Patch::simple("metadata.name", "metadata.name") };
        assert!(matches!(
            validate_patch(&patch, &composite(), &config_map(), &none(), &none()),
            Err(PatchError::Unsupported(k)) if k == kind
        ));
    }
    let patch = Patch { patch_type: Some(PatchType::from("Sideways")), ..Patch::simple("metadata.name", "metadata.name") };
    let err = validate_patch(&patch, &composite(), &config_map(), &none(), &none()).unwrap_err();
    assert_eq!(err.to_string(), "unknown patch type Sideways");
}

#[test]
fn empty_type_reads_as_from_composite() {
    let patch = Patch { patch_type: Some(PatchType::from("")), ..Patch::simple("spec.parameters.exampleField", "data[key]") };
    validate_patch(&patch, &composite(), &config_map(), &none(), &PathSet::parse_all(["data[key]"]).unwrap()).unwrap();

    let mut c = CompositionSkeleton::new(composite());
    c.with_name("t");
    c.new_resource(config_map()).register_field_paths(["data[key]"]).with_patches([patch]);
    let comp = c.finalize().unwrap();
    assert_eq!(comp.spec.resources[0].patches[0].patch_type, Some(PatchType::FromCompositeFieldPath));
}

#[test]
fn malformed_patch_path_is_a_parse_error() {
    let patch = Patch::simple("spec[", "metadata.name");
    assert!(matches!(
        validate_patch(&patch, &composite(), &config_map(), &none(), &none()),
        Err(PatchError::FromFieldPath(FieldPathError::Parse { .. }))
    ));
}

#[test]
fn inferred_schemas_accept_present_keys() {
    let base = ObjectKindReference::from_value(
        kube::core::GroupVersionKind::gvk("example.io", "v1", "Thing"),
        json!({ "spec": { "forProvider": { "region": "" } } }),
    );
    let ok = Patch::simple("spec.parameters.exampleField", "spec.forProvider.region");
    validate_patch(&ok, &composite(), &base, &none(), &none()).unwrap();
    let missing = Patch::simple("spec.parameters.exampleField", "spec.forProvider.zone");
    assert!(validate_patch(&missing, &composite(), &base, &none(), &none()).is_err());
}
