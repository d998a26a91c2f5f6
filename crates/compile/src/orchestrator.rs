use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use xrc_core::error_chain;

use crate::toolchain::{OutputLine, Toolchain};
use crate::{absolute, BuildUnit};

#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Number of workers, and so the most subprocesses alive at once.
    pub pool_size: usize,
    /// Hard limit per compilation.
    pub timeout: Duration,
    /// Artifact checks after a successful exit.
    pub poll_attempts: u32,
    pub poll_delay: Duration,
    /// Where artifacts are placed.
    pub plugin_dir: PathBuf,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            timeout: Duration::from_secs(300),
            poll_attempts: 3,
            poll_delay: Duration::from_millis(10),
            plugin_dir: PathBuf::from("plugins"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot start {program}")]
    Spawn { program: String, #[source] source: io::Error },
    #[error("waiting for the toolchain failed")]
    Wait(#[source] io::Error),
    #[error("toolchain exited with {0}")]
    Failed(ExitStatus),
    #[error("compilation exceeded {0:?}")]
    Timeout(Duration),
    #[error("artifact {} missing after {attempts} attempt(s)", path.display())]
    ArtifactMissing { path: PathBuf, attempts: u32 },
    #[error("i/o error on {}", path.display())]
    Io { path: PathBuf, #[source] source: io::Error },
    #[error("compile job panicked: {0}")]
    Panicked(String),
}

/// One queued compilation.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub unit: BuildUnit,
    pub artifact: PathBuf,
    pub attempts_remaining: u32,
    /// Set when a worker starts the job.
    pub deadline: Option<Instant>,
}

#[derive(Debug)]
pub struct CompileResult {
    pub unit: BuildUnit,
    pub outcome: Result<PathBuf, CompileError>,
}

struct Shared<T> {
    config: CompileConfig,
    toolchain: T,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Compiles build units on a fixed pool of workers.
pub struct Orchestrator<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Toolchain + 'static> Orchestrator<T> {
    pub fn new(config: CompileConfig, toolchain: T) -> Self {
        Self { shared: Arc::new(Shared { config, toolchain, active: AtomicUsize::new(0), peak: AtomicUsize::new(0) }) }
    }

    pub fn config(&self) -> &CompileConfig { &self.shared.config }

    /// Most subprocesses observed running at the same time.
    pub fn peak_concurrency(&self) -> usize { self.shared.peak.load(Ordering::SeqCst) }

    /// Compiles every unit and returns exactly one result per unit, in
    /// completion order.
    pub async fn run_all(&self, units: Vec<BuildUnit>) -> Vec<CompileResult> {
        let total = units.len();
        if total == 0 {
            return Vec::new();
        }
        let config = &self.shared.config;
        let plugin_dir = absolute(&config.plugin_dir);

        // both channels hold every job, so sends never wait
        let (job_tx, job_rx) = mpsc::channel::<CompileJob>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<CompileResult>(total);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = config.pool_size.max(1);
        let mut stops = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (stop_tx, stop_rx) = oneshot::channel();
            stops.push(stop_tx);
            handles.push(tokio::spawn(worker(id, self.shared.clone(), job_rx.clone(), result_tx.clone(), stop_rx)));
        }
        drop(result_tx);

        for unit in units {
            let artifact = plugin_dir.join(unit.artifact_file_name());
            let job = CompileJob { unit, artifact, attempts_remaining: config.poll_attempts, deadline: None };
            if job_tx.send(job).await.is_err() {
                error!("compile queue closed before all jobs were submitted");
                break;
            }
        }
        drop(job_tx);

        let mut results = Vec::with_capacity(total);
        while results.len() < total {
            match result_rx.recv().await {
                Some(result) => results.push(result),
                None => break,
            }
        }
        if results.len() < total {
            error!(expected = total, received = results.len(), "compile workers exited early");
        }

        for stop in stops {
            let _ = stop.send(());
        }
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "compile worker did not shut down cleanly");
            }
        }
        results
    }
}

async fn worker<T: Toolchain>(
    id: usize,
    shared: Arc<Shared<T>>,
    jobs: Arc<Mutex<mpsc::Receiver<CompileJob>>>,
    results: mpsc::Sender<CompileResult>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            _ = &mut stop => None,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };
        let unit = job.unit.clone();
        debug!(worker = id, unit = %unit.artifact_name, "compile started");
        let outcome = AssertUnwindSafe(compile(&shared, job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CompileError::Panicked(panic_message(panic.as_ref()))));
        if results.send(CompileResult { unit, outcome }).await.is_err() {
            break;
        }
    }
    debug!(worker = id, "compile worker stopped");
}

async fn compile<T: Toolchain>(shared: &Shared<T>, mut job: CompileJob) -> Result<PathBuf, CompileError> {
    let started = std::time::Instant::now();
    counter!("xrc_compile_total", 1u64);
    let outcome = run_job(shared, &mut job).await;
    histogram!("xrc_compile_ms", started.elapsed().as_secs_f64() * 1000.0);
    match &outcome {
        Ok(path) => {
            counter!("xrc_compile_ok_total", 1u64);
            info!(unit = %job.unit.artifact_name, artifact = %path.display(), "compiled");
        }
        Err(e) => {
            counter!("xrc_compile_err_total", 1u64);
            error!(unit = %job.unit.source_path.display(), error = %error_chain(e), "compile failed");
        }
    }
    outcome
}

async fn run_job<T: Toolchain>(shared: &Shared<T>, job: &mut CompileJob) -> Result<PathBuf, CompileError> {
    let timeout = shared.config.timeout;
    let deadline = *job.deadline.get_or_insert_with(|| Instant::now() + timeout);
    if let Some(parent) = job.artifact.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|source| CompileError::Io { path: parent.to_path_buf(), source })?;
    }

    let mut cmd = shared.toolchain.command(&job.unit, &job.artifact);
    cmd.current_dir(&job.unit.source_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    let _active = ActiveGuard::enter(shared);
    let mut child = cmd.spawn().map_err(|source| CompileError::Spawn { program, source })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let unit = job.unit.artifact_name.as_str();

    let run = async {
        let (produced, _, status) = tokio::join!(
            forward(unit, stdout, &shared.toolchain),
            forward(unit, stderr, &shared.toolchain),
            child.wait(),
        );
        (produced, status)
    };
    let (produced, status) = match tokio::time::timeout_at(deadline, run).await {
        Ok(done) => done,
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(unit, error = %e, "cannot kill timed out toolchain");
            }
            return Err(CompileError::Timeout(timeout));
        }
    };
    let status = status.map_err(CompileError::Wait)?;
    if !status.success() {
        return Err(CompileError::Failed(status));
    }
    await_artifact(job, produced.as_deref(), shared.config.poll_delay).await
}

/// Polls for the artifact, copying an announced library into place first.
async fn await_artifact(job: &mut CompileJob, produced: Option<&Path>, delay: Duration) -> Result<PathBuf, CompileError> {
    let budget = job.attempts_remaining;
    while job.attempts_remaining > 0 {
        job.attempts_remaining -= 1;
        if let Some(source) = produced.filter(|p| *p != job.artifact.as_path()) {
            if tokio::fs::metadata(source).await.is_ok() {
                tokio::fs::copy(source, &job.artifact)
                    .await
                    .map_err(|e| CompileError::Io { path: job.artifact.clone(), source: e })?;
            }
        }
        if tokio::fs::metadata(&job.artifact).await.map(|m| m.is_file()).unwrap_or(false) {
            return Ok(job.artifact.clone());
        }
        if job.attempts_remaining > 0 {
            tokio::time::sleep(delay).await;
        }
    }
    Err(CompileError::ArtifactMissing { path: job.artifact.clone(), attempts: budget })
}

async fn forward<R, T>(unit: &str, stream: Option<R>, toolchain: &T) -> Option<PathBuf>
where
    R: AsyncRead + Unpin,
    T: Toolchain,
{
    let stream = stream?;
    let mut lines = BufReader::new(stream).lines();
    let mut produced = None;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match toolchain.interpret(&line) {
                OutputLine::Log(text) => info!(unit, "{text}"),
                OutputLine::Detail(text) => debug!(unit, "{text}"),
                OutputLine::Artifact(path) => {
                    debug!(unit, library = %path.display(), "toolchain produced library");
                    produced = Some(path);
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!(unit, error = %e, "cannot read toolchain output");
                break;
            }
        }
    }
    produced
}

/// Counts a live subprocess for the guard's lifetime.
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter<T>(shared: &'a Shared<T>) -> Self {
        let now = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak.fetch_max(now, Ordering::SeqCst);
        gauge!("xrc_compile_active", now as f64);
        Self { active: &shared.active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("xrc_compile_active", now as f64);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
