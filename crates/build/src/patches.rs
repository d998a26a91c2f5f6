//! Patch validation against composite and composed objects.

use xrc_core::{Patch, PatchType};
use xrc_schema::{FieldPath, PathSet};

use crate::error::{FieldPathError, PatchError};
use crate::object::ObjectKindReference;

/// One end of a patch: the object and the paths registered on it.
#[derive(Clone, Copy)]
struct Side<'a> {
    object: &'a ObjectKindReference,
    registered: &'a PathSet,
}

impl Side<'_> {
    fn check(&self, raw: &str) -> Result<(), FieldPathError> {
        let path = FieldPath::parse(raw).map_err(|source| FieldPathError::Parse { path: raw.to_string(), source })?;
        if self.registered.contains(&path) || self.object.resolves(&path) {
            Ok(())
        } else {
            Err(FieldPathError::Unresolved { path: raw.to_string(), kind: self.object.kind_key() })
        }
    }
}

/// Checks both ends of `patch`. An unset or empty type is treated as
/// `FromCompositeFieldPath`.
pub fn validate_patch(
    patch: &Patch,
    composite: &ObjectKindReference,
    base: &ObjectKindReference,
    composite_paths: &PathSet,
    resource_paths: &PathSet,
) -> Result<(), PatchError> {
    let composite = Side { object: composite, registered: composite_paths };
    let resource = Side { object: base, registered: resource_paths };
    match patch.patch_type.clone().unwrap_or(PatchType::FromCompositeFieldPath) {
        PatchType::FromCompositeFieldPath => validate_direct(patch, composite, resource),
        PatchType::Other(value) if value.is_empty() => validate_direct(patch, composite, resource),
        PatchType::ToCompositeFieldPath => validate_direct(patch, resource, composite),
        PatchType::CombineFromComposite => validate_combine(patch, composite, resource),
        PatchType::CombineToComposite => validate_combine(patch, resource, composite),
        kind @ (PatchType::PatchSet
        | PatchType::FromEnvironmentFieldPath
        | PatchType::ToEnvironmentFieldPath
        | PatchType::CombineFromEnvironment
        | PatchType::CombineToEnvironment) => Err(PatchError::Unsupported(kind)),
        PatchType::Other(value) => Err(PatchError::Unknown(value)),
    }
}

fn validate_direct(patch: &Patch, from: Side<'_>, to: Side<'_>) -> Result<(), PatchError> {
    let from_path = patch.from_field_path.as_deref().ok_or(PatchError::MissingField("fromFieldPath"))?;
    // toFieldPath defaults to fromFieldPath
    let to_path = patch.to_field_path.as_deref().unwrap_or(from_path);
    from.check(from_path).map_err(PatchError::FromFieldPath)?;
    to.check(to_path).map_err(PatchError::ToFieldPath)
}

fn validate_combine(patch: &Patch, from: Side<'_>, to: Side<'_>) -> Result<(), PatchError> {
    let combine = patch.combine.as_ref().ok_or(PatchError::MissingField("combine"))?;
    if combine.variables.is_empty() {
        return Err(PatchError::NoVariables);
    }
    for (index, variable) in combine.variables.iter().enumerate() {
        from.check(&variable.from_field_path).map_err(|source| PatchError::CombineVariable { index, source })?;
    }
    let to_path = patch.to_field_path.as_deref().ok_or(PatchError::MissingField("toFieldPath"))?;
    to.check(to_path).map_err(PatchError::ToFieldPath)
}
