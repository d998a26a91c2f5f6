//! Drives loaded builders and hands the finished compositions to a writer.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use serde::Serialize;
use tracing::{error, info};
use xrc_core::Composition;

use crate::{Builder, CompositionSkeleton};

/// Sink for serialized compositions.
pub trait Writer {
    fn write(&self, name: &str, serialized: &str) -> Result<()>;
}

/// Writes `<dir>/<name>.yaml`, creating `dir` on first use.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    dir: PathBuf,
}

impl DirectoryWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
}

impl Writer for DirectoryWriter {
    fn write(&self, name: &str, serialized: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(format!("{name}.yaml"));
        std::fs::write(&path, serialized).with_context(|| format!("writing {}", path.display()))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub written: usize,
    pub dropped: usize,
}

pub struct Runner<W> {
    writer: W,
}

impl<W: Writer> Runner<W> {
    pub fn new(writer: W) -> Self { Self { writer } }

    /// Builds every `(unit, builder)` pair in order. A failing builder only
    /// drops its own composition; a writer failure aborts the run.
    pub fn run<'a, I>(&self, builders: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = (&'a str, &'a dyn Builder)>,
    {
        let mut summary = RunSummary::default();
        for (index, (unit, builder)) in builders.into_iter().enumerate() {
            let composition = match compose(builder) {
                Ok(c) => c,
                Err(e) => {
                    error!(unit, index, error = %format!("{e:#}"), "dropping composition");
                    counter!("xrc_compositions_dropped_total", 1u64);
                    summary.dropped += 1;
                    continue;
                }
            };
            let serialized = match serde_yaml::to_string(&composition) {
                Ok(s) => s,
                Err(e) => {
                    error!(unit, index, composition = composition.name(), error = %e, "dropping unserializable composition");
                    counter!("xrc_compositions_dropped_total", 1u64);
                    summary.dropped += 1;
                    continue;
                }
            };
            self.writer
                .write(composition.name(), &serialized)
                .with_context(|| format!("writing composition {:?} from {unit}", composition.name()))?;
            info!(unit, composition = composition.name(), mode = %composition.spec.mode, "composition written");
            counter!("xrc_compositions_written_total", 1u64);
            summary.written += 1;
        }
        Ok(summary)
    }
}

fn compose(builder: &dyn Builder) -> Result<Composition> {
    let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<Composition> {
        let mut skeleton = CompositionSkeleton::new(builder.composite_type_ref());
        builder.build(&mut skeleton).context("builder failed")?;
        let name = skeleton.name().to_string();
        skeleton.finalize().with_context(|| format!("cannot finalize composition {name:?}"))
    }));
    outcome.unwrap_or_else(|_| Err(anyhow!("builder panicked")))
}
