use thiserror::Error;
use xrc_core::PatchType;
use xrc_schema::ParseError;

/// Which registry an unparsable registered path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathScope {
    Composite,
    Composed,
}

impl std::fmt::Display for PathScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathScope::Composite => f.write_str("composite"),
            PathScope::Composed => f.write_str("composed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("composition name must not be empty")]
    EmptyName,
    #[error("{count} pipeline step(s) declared on a Resources mode composition")]
    PipelineStepsInResourcesMode { count: usize },
    #[error("{count} composed resource(s) declared on a Pipeline mode composition")]
    ResourcesInPipelineMode { count: usize },
    #[error("cannot parse registered {scope} path {path:?}")]
    InvalidRegisteredPath { scope: PathScope, path: String, #[source] source: ParseError },
    #[error("invalid patch at index {index}")]
    InvalidPatch { index: usize, #[source] source: PatchError },
    #[error("pipeline step {step:?} has no function reference")]
    MissingFunctionRef { step: String },
    #[error("cannot build composed template at index {index}{}", .name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default())]
    ComposedTemplate { index: usize, name: Option<String>, #[source] source: Box<BuildError> },
    #[error("cannot build pipeline step at index {index} ({step})")]
    PipelineStep { index: usize, step: String, #[source] source: Box<BuildError> },
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("no variables given")]
    NoVariables,
    #[error("fromFieldPath of variable at index {index} is invalid")]
    CombineVariable { index: usize, #[source] source: FieldPathError },
    #[error("fromFieldPath is invalid")]
    FromFieldPath(#[source] FieldPathError),
    #[error("toFieldPath is invalid")]
    ToFieldPath(#[source] FieldPathError),
    #[error("patch types not supported: {0}")]
    Unsupported(PatchType),
    #[error("unknown patch type {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum FieldPathError {
    #[error("cannot parse field path {path:?}")]
    Parse { path: String, #[source] source: ParseError },
    #[error("field path {path:?} is neither in the schema of {kind} nor registered")]
    Unresolved { path: String, kind: String },
}
