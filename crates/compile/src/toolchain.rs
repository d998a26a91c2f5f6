//! External compilers that turn a build unit into a loadable artifact.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use crate::{absolute, BuildUnit};

/// Variable carrying the unit's absolute path into its compilation, read by
/// builders through `option_env!` to find bundled templates.
pub const TEMPLATE_BASE_PATH_ENV: &str = "XRC_TEMPLATE_BASE_PATH";

/// How one line of toolchain output should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Shown at `info`.
    Log(String),
    /// Machine-readable noise, shown at `debug`.
    Detail(String),
    /// The toolchain reports it produced this library.
    Artifact(PathBuf),
}

pub trait Toolchain: Send + Sync {
    /// Command compiling `unit` so that the library ends up at `artifact`
    /// (or is announced through [`OutputLine::Artifact`]).
    fn command(&self, unit: &BuildUnit, artifact: &Path) -> Command;

    fn interpret(&self, line: &str) -> OutputLine { OutputLine::Log(line.to_string()) }
}

/// `cargo rustc --crate-type cdylib` with a target directory per unit.
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    cargo: String,
    target_root: PathBuf,
    release: bool,
}

impl CargoToolchain {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
        Self { cargo, target_root: target_root.into(), release: false }
    }

    pub fn release(mut self, release: bool) -> Self {
        self.release = release;
        self
    }
}

#[derive(Deserialize)]
struct CargoMessage {
    reason: String,
    #[serde(default)]
    target: Option<CargoTarget>,
    #[serde(default)]
    filenames: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct CargoTarget {
    #[serde(default)]
    crate_types: Vec<String>,
}

impl Toolchain for CargoToolchain {
    fn command(&self, unit: &BuildUnit, _artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.cargo);
        cmd.args(["rustc", "--lib", "--crate-type", "cdylib", "--message-format", "json-render-diagnostics"]);
        if self.release {
            cmd.arg("--release");
        }
        cmd.arg("--manifest-path").arg(absolute(&unit.source_path).join("Cargo.toml"));
        cmd.env("CARGO_TARGET_DIR", absolute(&self.target_root).join(&unit.artifact_name));
        cmd.env(TEMPLATE_BASE_PATH_ENV, absolute(&unit.source_path));
        cmd
    }

    fn interpret(&self, line: &str) -> OutputLine {
        if !line.starts_with('{') {
            return OutputLine::Log(line.to_string());
        }
        let Ok(msg) = serde_json::from_str::<CargoMessage>(line) else {
            return OutputLine::Log(line.to_string());
        };
        let is_cdylib = msg.target.as_ref().map_or(false, |t| t.crate_types.iter().any(|c| c == "cdylib"));
        if msg.reason == "compiler-artifact" && is_cdylib {
            let library = msg
                .filenames
                .into_iter()
                .find(|f| f.extension().map_or(false, |e| e == std::env::consts::DLL_EXTENSION));
            if let Some(library) = library {
                return OutputLine::Artifact(library);
            }
        }
        OutputLine::Detail(line.to_string())
    }
}

/// Any program; `{output}` and `{unit}` in arguments and environment values
/// expand to the absolute artifact and unit paths.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandToolchain {
    pub fn new(program: impl Into<String>) -> Self { Self { program: program.into(), args: Vec::new(), env: Vec::new() } }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl Toolchain for CommandToolchain {
    fn command(&self, unit: &BuildUnit, artifact: &Path) -> Command {
        let output = absolute(artifact).display().to_string();
        let unit_path = absolute(&unit.source_path).display().to_string();
        let expand = |s: &str| s.replace("{output}", &output).replace("{unit}", &unit_path);
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| expand(a)));
        cmd.envs(self.env.iter().map(|(k, v)| (k.clone(), expand(v))));
        cmd.env(TEMPLATE_BASE_PATH_ENV, &unit_path);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cargo_announces_only_the_unit_library() {
        let tc = CargoToolchain::new("/tmp/xrc-target");
        let ext = std::env::consts::DLL_EXTENSION;
        let own = format!(
            r#"{{"reason":"compiler-artifact","target":{{"kind":["lib"],"crate_types":["cdylib"],"name":"example"}},"filenames":["/t/debug/libexample.{ext}"]}}"#
        );
        assert_eq!(tc.interpret(&own), OutputLine::Artifact(PathBuf::from(format!("/t/debug/libexample.{ext}"))));

        let proc_macro = format!(
            r#"{{"reason":"compiler-artifact","target":{{"kind":["proc-macro"],"crate_types":["proc-macro"],"name":"serde_derive"}},"filenames":["/t/debug/deps/libserde_derive.{ext}"]}}"#
        );
        assert!(matches!(tc.interpret(&proc_macro), OutputLine::Detail(_)));
        assert!(matches!(tc.interpret(r#"{"reason":"build-finished","success":true}"#), OutputLine::Detail(_)));
        assert_eq!(tc.interpret("   Compiling example v0.1.0"), OutputLine::Log("   Compiling example v0.1.0".into()));
    }

    #[test]
    fn cargo_command_isolates_target_dir() {
        let unit = BuildUnit::new(Path::new("/src/compositions"), "/src/compositions/team/db");
        let cmd = CargoToolchain::new("/plugins/.target").release(true).command(&unit, Path::new("/plugins/team_db.so"));
        let std_cmd = cmd.as_std();
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.starts_with(&["rustc".to_string(), "--lib".to_string(), "--crate-type".to_string(), "cdylib".to_string()]));
        assert!(args.contains(&"--release".to_string()));
        assert!(args.contains(&"/src/compositions/team/db/Cargo.toml".to_string()));
        let envs: Vec<_> = std_cmd
            .get_envs()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.map(|v| v.to_string_lossy().into_owned())))
            .collect();
        assert!(envs.contains(&("CARGO_TARGET_DIR".into(), Some("/plugins/.target/team_db".into()))));
        assert!(envs.contains(&(TEMPLATE_BASE_PATH_ENV.into(), Some("/src/compositions/team/db".into()))));
    }

    #[test]
    fn command_placeholders_expand() {
        let unit = BuildUnit::new(Path::new("/src"), "/src/example");
        let tc = CommandToolchain::new("sh").args(["-c", "touch {output}"]).env("UNIT", "{unit}");
        let cmd = tc.command(&unit, Path::new("/plugins/example.so"));
        let args: Vec<_> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-c", "touch /plugins/example.so"]);
        assert!(cmd.as_std().get_envs().any(|(k, v)| k == "UNIT" && v.map_or(false, |v| v == "/src/example")));
    }
}
