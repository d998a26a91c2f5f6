//! xrc compile: discovers build units and compiles each into a loadable
//! artifact on a bounded pool of tokio workers.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

mod discovery;
mod orchestrator;
pub mod toolchain;

pub use discovery::{discover, BuildUnit, DiscoveryError};
pub use orchestrator::{CompileConfig, CompileError, CompileJob, CompileResult, Orchestrator};
pub use toolchain::{CargoToolchain, CommandToolchain, OutputLine, Toolchain, TEMPLATE_BASE_PATH_ENV};

/// `path` made absolute against the current directory; subprocesses run
/// inside their unit directory.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
}
