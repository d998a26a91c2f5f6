use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};
use xrc_core::{ComposedPatch, FunctionReference, PipelineStep};

use crate::error::BuildError;
use crate::object::ObjectKindReference;

/// Draft of one pipeline step, owned by its composition.
#[derive(Debug, Clone)]
pub struct PipelineStepSkeleton {
    step: String,
    function_ref: Option<FunctionReference>,
    input: Option<ObjectKindReference>,
    patches: BTreeMap<String, Vec<ComposedPatch>>,
    merge_patches: bool,
}

impl PipelineStepSkeleton {
    pub(crate) fn new(step: String) -> Self {
        Self { step, function_ref: None, input: None, patches: BTreeMap::new(), merge_patches: false }
    }

    pub fn step(&self) -> &str { &self.step }

    pub fn with_function_ref(&mut self, function_ref: FunctionReference) -> &mut Self {
        self.function_ref = Some(function_ref);
        self
    }

    pub fn with_input(&mut self, input: ObjectKindReference) -> &mut Self {
        self.input = Some(input);
        self
    }

    pub fn with_patch(&mut self, resource: impl Into<String>, patch: ComposedPatch) -> &mut Self {
        self.patches.entry(resource.into()).or_default().push(patch);
        self
    }

    pub fn with_patches(&mut self, resource: impl Into<String>, patches: impl IntoIterator<Item = ComposedPatch>) -> &mut Self {
        self.patches.entry(resource.into()).or_default().extend(patches);
        self
    }

    /// Append the per-resource patches to the input's `resources[].patches`
    /// when the step is converted. Off by default.
    pub fn merge_patches_into_input(&mut self, enabled: bool) -> &mut Self {
        self.merge_patches = enabled;
        self
    }

    /// Patches keyed by resource name, in insertion order per resource.
    pub fn patches(&self) -> &BTreeMap<String, Vec<ComposedPatch>> { &self.patches }

    pub(crate) fn into_step(self) -> Result<PipelineStep, BuildError> {
        let function_ref = self.function_ref.ok_or_else(|| BuildError::MissingFunctionRef { step: self.step.clone() })?;
        let mut input = self.input.as_ref().map(ObjectKindReference::with_type_meta);
        if self.merge_patches && !self.patches.is_empty() {
            match input.as_mut() {
                Some(input) => merge_into_input(&self.step, input, &self.patches),
                None => warn!(step = %self.step, "patch merge requested but the step has no input"),
            }
        }
        Ok(PipelineStep { step: self.step, function_ref, input })
    }
}

fn merge_into_input(step: &str, input: &mut Value, patches: &BTreeMap<String, Vec<ComposedPatch>>) {
    let Some(resources) = input.get_mut("resources").and_then(Value::as_array_mut) else {
        warn!(step, "input has no resources list; patches not merged");
        return;
    };
    for (name, list) in patches {
        let entry = resources
            .iter_mut()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(name.as_str()))
            .and_then(Value::as_object_mut);
        let Some(entry) = entry else {
            warn!(step, resource = %name, "no input resource with this name; patches not merged");
            continue;
        };
        let target = entry.entry("patches").or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(existing) = target {
            existing.extend(list.iter().filter_map(|p| serde_json::to_value(p).ok()));
            debug!(step, resource = %name, count = list.len(), "merged patches into input");
        } else {
            warn!(step, resource = %name, "input resource patches is not a list; patches not merged");
        }
    }
}
