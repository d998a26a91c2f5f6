use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;
use xrc_core::{
    ComposedTemplate, Composition, CompositionMode, CompositionSpec, PipelineStep, StoreConfigReference, StringMap,
    TypeReference, KNOWN_COMPOSITE_ANNOTATIONS, KNOWN_COMPOSITE_LABELS,
};
use xrc_schema::PathSet;

use crate::composed::ComposedTemplateSkeleton;
use crate::error::{BuildError, PathScope};
use crate::object::ObjectKindReference;
use crate::pipeline::PipelineStepSkeleton;
use crate::{annotation_path, label_path};

/// Build-time state of one composition.
///
/// Builders populate it through the `with_*`, `register_*` and `new_*`
/// methods; [`CompositionSkeleton::finalize`] validates every patch and
/// produces the [`Composition`].
#[derive(Debug, Clone)]
pub struct CompositionSkeleton {
    composite: ObjectKindReference,
    name: String,
    mode: Option<CompositionMode>,
    labels: StringMap,
    annotations: StringMap,
    registered_paths: Vec<String>,
    composed_templates: Vec<ComposedTemplateSkeleton>,
    pipeline_steps: Vec<PipelineStepSkeleton>,
    write_connection_secrets_to_namespace: Option<String>,
    publish_connection_details_with_store_config: Option<StoreConfigReference>,
}

impl CompositionSkeleton {
    pub fn new(composite: ObjectKindReference) -> Self {
        Self {
            composite,
            name: String::new(),
            mode: None,
            labels: StringMap::new(),
            annotations: StringMap::new(),
            registered_paths: Vec::new(),
            composed_templates: Vec::new(),
            pipeline_steps: Vec::new(),
            write_connection_secrets_to_namespace: None,
            publish_connection_details_with_store_config: None,
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn composite(&self) -> &ObjectKindReference { &self.composite }

    pub fn with_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Merged into any labels set earlier.
    pub fn with_labels<I, K, V>(&mut self, labels: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Merged into any annotations set earlier.
    pub fn with_annotations<I, K, V>(&mut self, annotations: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.annotations.extend(annotations.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_mode(&mut self, mode: CompositionMode) -> &mut Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_write_connection_secrets_to_namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.write_connection_secrets_to_namespace = Some(namespace.into());
        self
    }

    pub fn with_publish_connection_details_with_store_config(&mut self, store: StoreConfigReference) -> &mut Self {
        self.publish_connection_details_with_store_config = Some(store);
        self
    }

    pub fn register_composite_field_paths<I, S>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registered_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn register_composite_labels<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register_composite_field_paths(keys.into_iter().map(|k| label_path(k.as_ref())))
    }

    pub fn register_composite_annotations<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register_composite_field_paths(keys.into_iter().map(|k| annotation_path(k.as_ref())))
    }

    /// Adds a composed resource. Only valid in Resources mode.
    pub fn new_resource(&mut self, base: ObjectKindReference) -> &mut ComposedTemplateSkeleton {
        self.composed_templates.push(ComposedTemplateSkeleton::new(base));
        let last = self.composed_templates.len() - 1;
        &mut self.composed_templates[last]
    }

    /// Adds a pipeline step. Only valid in Pipeline mode.
    pub fn new_pipeline_step(&mut self, step: impl Into<String>) -> &mut PipelineStepSkeleton {
        self.pipeline_steps.push(PipelineStepSkeleton::new(step.into()));
        let last = self.pipeline_steps.len() - 1;
        &mut self.pipeline_steps[last]
    }

    pub fn finalize(mut self) -> Result<Composition, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        self.register_composite_annotations(KNOWN_COMPOSITE_ANNOTATIONS.iter().copied());
        self.register_composite_labels(KNOWN_COMPOSITE_LABELS.iter().copied());

        let mode = self.mode.unwrap_or_default();
        let (resources, pipeline) = match mode {
            CompositionMode::Resources => {
                if !self.pipeline_steps.is_empty() {
                    return Err(BuildError::PipelineStepsInResourcesMode { count: self.pipeline_steps.len() });
                }
                (self.setup_composed()?, Vec::new())
            }
            CompositionMode::Pipeline => {
                if !self.composed_templates.is_empty() {
                    return Err(BuildError::ResourcesInPipelineMode { count: self.composed_templates.len() });
                }
                (Vec::new(), self.setup_pipeline()?)
            }
        };

        let spec = CompositionSpec {
            composite_type_ref: TypeReference::to(&self.composite.gvk),
            mode,
            resources,
            pipeline,
            write_connection_secrets_to_namespace: self.write_connection_secrets_to_namespace,
            publish_connection_details_with_store_config_ref: self.publish_connection_details_with_store_config,
        };
        let mut composition = Composition::new(self.name, spec);
        composition.metadata = ObjectMeta {
            labels: (!self.labels.is_empty()).then_some(self.labels),
            annotations: (!self.annotations.is_empty()).then_some(self.annotations),
            ..composition.metadata
        };
        Ok(composition)
    }

    fn setup_composed(&mut self) -> Result<Vec<ComposedTemplate>, BuildError> {
        let composite_paths = PathSet::parse_all(&self.registered_paths)
            .map_err(|(path, source)| BuildError::InvalidRegisteredPath { scope: PathScope::Composite, path, source })?;
        let skeletons = std::mem::take(&mut self.composed_templates);
        let mut templates = Vec::with_capacity(skeletons.len());
        for (index, skeleton) in skeletons.into_iter().enumerate() {
            let name = skeleton.name().map(str::to_string);
            let template = skeleton
                .into_template(&self.composite, &composite_paths)
                .map_err(|e| BuildError::ComposedTemplate { index, name, source: Box::new(e) })?;
            templates.push(template);
        }
        Ok(templates)
    }

    fn setup_pipeline(&mut self) -> Result<Vec<PipelineStep>, BuildError> {
        let skeletons = std::mem::take(&mut self.pipeline_steps);
        let mut steps = Vec::with_capacity(skeletons.len());
        for (index, skeleton) in skeletons.into_iter().enumerate() {
            let step = skeleton.step().to_string();
            debug!(composition = %self.name, step = %step, "pipeline step");
            let converted =
                skeleton.into_step().map_err(|e| BuildError::PipelineStep { index, step, source: Box::new(e) })?;
            steps.push(converted);
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::GroupVersionKind;
    use serde_json::json;

    fn composite() -> ObjectKindReference {
        ObjectKindReference::from_value(
            GroupVersionKind::gvk("example.io", "v1alpha1", "XThing"),
            json!({ "spec": { "size": "small" } }),
        )
    }

    #[test]
    fn labels_and_annotations_merge() {
        let mut c = CompositionSkeleton::new(composite());
        c.with_name("merge")
            .with_labels([("a", "1"), ("b", "2")])
            .with_labels([("b", "3")])
            .with_annotations([("note", "x")]);
        let comp = c.finalize().unwrap();
        let labels = comp.metadata.labels.unwrap();
        assert_eq!(labels["a"], "1");
        assert_eq!(labels["b"], "3");
        assert_eq!(comp.metadata.annotations.unwrap()["note"], "x");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(CompositionSkeleton::new(composite()).finalize(), Err(BuildError::EmptyName)));
    }

    #[test]
    fn registered_composite_path_must_parse() {
        let mut c = CompositionSkeleton::new(composite());
        c.with_name("bad").register_composite_field_paths(["spec[["]);
        let err = c.finalize().unwrap_err();
        assert!(matches!(err, BuildError::InvalidRegisteredPath { scope: PathScope::Composite, ref path, .. } if path == "spec[["));
    }
}
