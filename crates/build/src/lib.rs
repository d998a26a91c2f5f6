//! xrc build: the composition assembler handed to every builder.
//!
//! A builder binds itself to a composite type, fills a [`CompositionSkeleton`]
//! with composed resources or pipeline steps, and the skeleton validates every
//! patch field path when it is finalized into a [`xrc_core::Composition`].

#![deny(unsafe_code)]

mod composed;
mod composition;
mod error;
mod object;
mod patches;
mod pipeline;
pub mod plugin;
pub mod runner;
pub mod templates;

pub use composed::ComposedTemplateSkeleton;
pub use composition::CompositionSkeleton;
pub use error::{BuildError, FieldPathError, PatchError, PathScope};
pub use object::ObjectKindReference;
pub use patches::validate_patch;
pub use pipeline::PipelineStepSkeleton;
pub use plugin::{BuilderDeclaration, ABI_VERSION, BUILDER_SYMBOL, BUILD_VERSION};
pub use runner::{DirectoryWriter, RunSummary, Runner, Writer};
pub use templates::load_template;

/// A composition definition, usually exported from a build unit with
/// [`export_builder!`].
pub trait Builder: Send + Sync {
    /// The composite type the composition is defined for.
    fn composite_type_ref(&self) -> ObjectKindReference;

    fn build(&self, composition: &mut CompositionSkeleton) -> anyhow::Result<()>;
}

pub(crate) fn label_path(key: &str) -> String { format!("metadata.labels[{key}]") }

pub(crate) fn annotation_path(key: &str) -> String { format!("metadata.annotations[{key}]") }
