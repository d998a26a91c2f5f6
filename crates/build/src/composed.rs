use xrc_core::{
    ComposedTemplate, ConnectionDetail, Patch, PatchType, ReadinessCheck, KNOWN_RESOURCE_ANNOTATIONS, KNOWN_RESOURCE_LABELS,
};
use xrc_schema::PathSet;

use crate::error::{BuildError, PathScope};
use crate::object::ObjectKindReference;
use crate::patches::validate_patch;
use crate::{annotation_path, label_path};

#[derive(Debug, Clone)]
struct PatchEntry {
    patch: Patch,
    unchecked: bool,
}

/// Draft of one composed resource, owned by its composition.
#[derive(Debug, Clone)]
pub struct ComposedTemplateSkeleton {
    name: Option<String>,
    base: ObjectKindReference,
    patches: Vec<PatchEntry>,
    connection_details: Vec<ConnectionDetail>,
    readiness_checks: Vec<ReadinessCheck>,
    registered_paths: Vec<String>,
}

impl ComposedTemplateSkeleton {
    pub(crate) fn new(base: ObjectKindReference) -> Self {
        Self {
            name: None,
            base,
            patches: Vec::new(),
            connection_details: Vec::new(),
            readiness_checks: Vec::new(),
            registered_paths: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    pub fn with_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Patches validated at finalize time.
    pub fn with_patches(&mut self, patches: impl IntoIterator<Item = Patch>) -> &mut Self {
        self.patches.extend(patches.into_iter().map(|patch| PatchEntry { patch, unchecked: false }));
        self
    }

    /// Patches whose field paths are never validated.
    pub fn with_unsafe_patches(&mut self, patches: impl IntoIterator<Item = Patch>) -> &mut Self {
        self.patches.extend(patches.into_iter().map(|patch| PatchEntry { patch, unchecked: true }));
        self
    }

    pub fn with_connection_details(&mut self, details: impl IntoIterator<Item = ConnectionDetail>) -> &mut Self {
        self.connection_details.extend(details);
        self
    }

    pub fn with_readiness_checks(&mut self, checks: impl IntoIterator<Item = ReadinessCheck>) -> &mut Self {
        self.readiness_checks.extend(checks);
        self
    }

    pub fn register_field_paths<I, S>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registered_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn register_labels<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register_field_paths(keys.into_iter().map(|k| label_path(k.as_ref())))
    }

    pub fn register_annotations<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register_field_paths(keys.into_iter().map(|k| annotation_path(k.as_ref())))
    }

    pub(crate) fn into_template(
        mut self,
        composite: &ObjectKindReference,
        composite_paths: &PathSet,
    ) -> Result<ComposedTemplate, BuildError> {
        self.register_annotations(KNOWN_RESOURCE_ANNOTATIONS.iter().copied());
        self.register_labels(KNOWN_RESOURCE_LABELS.iter().copied());
        let resource_paths = PathSet::parse_all(&self.registered_paths)
            .map_err(|(path, source)| BuildError::InvalidRegisteredPath { scope: PathScope::Composed, path, source })?;

        let mut patches = Vec::with_capacity(self.patches.len());
        for (index, entry) in self.patches.into_iter().enumerate() {
            let mut patch = entry.patch;
            if !entry.unchecked {
                validate_patch(&patch, composite, &self.base, composite_paths, &resource_paths)
                    .map_err(|source| BuildError::InvalidPatch { index, source })?;
                if patch.patch_type.as_ref().map_or(true, |t| t.as_str().is_empty()) {
                    patch.patch_type = Some(PatchType::FromCompositeFieldPath);
                }
            }
            patches.push(patch);
        }

        Ok(ComposedTemplate {
            name: self.name,
            base: self.base.stamped(),
            patches,
            connection_details: self.connection_details,
            readiness_checks: self.readiness_checks,
        })
    }
}
