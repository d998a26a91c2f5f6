//! xrc loader: opens compiled build units and hands out the builders they
//! export.
//!
//! Loading foreign code is inherently unsafe; everything else in the
//! workspace forbids `unsafe`, so it is confined to [`load`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use libloading::Library;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info};
use xrc_build::{Builder, BuilderDeclaration, ABI_VERSION, BUILDER_SYMBOL, BUILD_VERSION};
use xrc_compile::CompileResult;
use xrc_core::error_chain;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {}", path.display())]
    Open { path: PathBuf, #[source] source: libloading::Error },
    #[error("{} does not export {symbol}", path.display())]
    MissingSymbol { path: PathBuf, symbol: &'static str, #[source] source: libloading::Error },
    #[error("{} was built against {found}, host expects {expected}", path.display())]
    Incompatible { path: PathBuf, expected: String, found: String },
}

/// A builder together with the library its code lives in.
pub struct LoadedBuilder {
    // Declared before the library so it is dropped first.
    builder: Box<dyn Builder>,
    path: PathBuf,
    _library: Library,
}

impl LoadedBuilder {
    pub fn builder(&self) -> &dyn Builder { self.builder.as_ref() }

    pub fn path(&self) -> &Path { &self.path }
}

impl std::fmt::Debug for LoadedBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBuilder").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Opens `path` and constructs the builder declared by its `XRC_BUILDER`
/// static.
pub fn load(path: impl AsRef<Path>) -> Result<LoadedBuilder, LoadError> {
    let path = path.as_ref().to_path_buf();
    // SAFETY: running a library's initializers is the point of loading a
    // build unit; artifacts come from our own compile step.
    let library = unsafe { Library::new(&path) }.map_err(|source| LoadError::Open { path: path.clone(), source })?;

    let builder = {
        // SAFETY: the symbol is a static, so the resolved address is a
        // pointer to it. Its layout is only trusted after the ABI check.
        let symbol = unsafe { library.get::<*const BuilderDeclaration>(BUILDER_SYMBOL.as_bytes()) }
            .map_err(|source| LoadError::MissingSymbol { path: path.clone(), symbol: BUILDER_SYMBOL, source })?;
        // SAFETY: `abi_version` is the first field of a `repr(C)` struct in
        // every ABI revision; the rest is read only when the revisions match.
        let declaration: &BuilderDeclaration = unsafe { &**symbol };
        check_declaration(&path, declaration)?;
        (declaration.create)()
    };
    debug!(path = %path.display(), "builder loaded");
    Ok(LoadedBuilder { builder, path, _library: library })
}

/// Accepts only declarations built against this host's ABI revision and
/// `xrc-build` version. The version is read only once the ABI matches.
pub fn check_declaration(path: &Path, declaration: &BuilderDeclaration) -> Result<(), LoadError> {
    if declaration.abi_version != ABI_VERSION {
        return Err(LoadError::Incompatible {
            path: path.to_path_buf(),
            expected: format!("abi {ABI_VERSION}"),
            found: format!("abi {}", declaration.abi_version),
        });
    }
    if declaration.build_version != BUILD_VERSION {
        return Err(LoadError::Incompatible {
            path: path.to_path_buf(),
            expected: format!("xrc-build {BUILD_VERSION}"),
            found: format!("xrc-build {}", declaration.build_version),
        });
    }
    Ok(())
}

/// Loaded builders keyed by the artifact name of their build unit.
#[derive(Debug, Default)]
pub struct BuilderRegistry {
    builders: BTreeMap<String, LoadedBuilder>,
}

impl BuilderRegistry {
    pub fn new() -> Self { Self::default() }

    /// Loads every successful compile result; failures are logged and
    /// skipped. Returns how many builders were added.
    pub fn load_all(&mut self, results: &[CompileResult]) -> usize {
        let mut loaded = 0;
        for (index, result) in results.iter().enumerate() {
            let unit = result.unit.artifact_name.as_str();
            let artifact = match &result.outcome {
                Ok(artifact) => artifact,
                Err(_) => {
                    debug!(unit, index, "skipping unit that did not compile");
                    continue;
                }
            };
            match load(artifact) {
                Ok(builder) => {
                    counter!("xrc_load_ok_total", 1u64);
                    self.insert(unit, builder);
                    loaded += 1;
                }
                Err(e) => {
                    counter!("xrc_load_err_total", 1u64);
                    error!(unit, index, source_path = %result.unit.source_path.display(), error = %error_chain(&e), "cannot load builder");
                }
            }
        }
        info!(loaded, total = results.len(), "builders loaded");
        loaded
    }

    /// Replaces any builder already registered under `unit`.
    pub fn insert(&mut self, unit: impl Into<String>, builder: LoadedBuilder) -> Option<LoadedBuilder> {
        self.builders.insert(unit.into(), builder)
    }

    pub fn get(&self, unit: &str) -> Option<&dyn Builder> { self.builders.get(unit).map(LoadedBuilder::builder) }

    pub fn len(&self) -> usize { self.builders.len() }

    pub fn is_empty(&self) -> bool { self.builders.is_empty() }

    /// `(unit, builder)` pairs in unit order, as consumed by
    /// [`xrc_build::Runner::run`].
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Builder)> + '_ {
        self.builders.iter().map(|(unit, loaded)| (unit.as_str(), loaded.builder()))
    }
}
