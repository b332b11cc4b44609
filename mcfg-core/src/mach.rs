//! Asking the build front-end, `mach`, about the build.

use std::collections::BTreeMap;
use std::sync::Arc;

use derivative::Derivative;
use mcfg_cfg::{Config, ConfigSet};
use mcfg_ore::shell::ShellParseError;
use mcfg_process::{Invocation, ProcessError, ProcessRunner};
use mcfg_types::FilePath;
use serde::{Deserialize, Serialize};

pub static MACH_COMMAND: Config<&'static str> = Config::new(
    "mach_command",
    "Shell quoted command to run instead of the mach in the root of the source tree.",
    "",
);

pub static MACH_ENVIRONMENT: Config<&'static str> = Config::new(
    "mach_environment",
    "Shell quoted list of KEY=VALUE environment variables to run mach with.",
    "",
);

/// Errors from running `mach`.
#[derive(Debug, thiserror::Error)]
pub enum MachError {
    #[error("invalid '{setting}' setting: {source}")]
    Override {
        setting: &'static str,
        #[source]
        source: ShellParseError,
    },
    #[error("invalid 'mach_environment' entry '{0}', expected KEY=VALUE")]
    EnvironmentEntry(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("'{command}' exited with code {exit_code}")]
    Exit {
        command: String,
        exit_code: i32,
        output: Vec<String>,
    },
    #[error("unable to parse mach environment: {0}")]
    Json(#[from] serde_json::Error),
}

/// The active mozconfig, as reported by `mach environment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MozConfig {
    pub configure_args: Vec<String>,
    pub make_extra: Vec<String>,
    pub make_flags: Vec<String>,
    pub path: String,
}

/// Output of `mach environment --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachEnvironment {
    pub mozconfig: MozConfig,
    pub topobjdir: String,
    pub topsrcdir: String,
}

/// Runs `mach` for a source tree.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Mach {
    srcdir: FilePath,
    /// `mach` at the root of the source tree.
    command: Vec<String>,

    #[derivative(Debug = "ignore")]
    configs: ConfigSet,
    #[derivative(Debug = "ignore")]
    runner: Arc<dyn ProcessRunner>,
}

impl Mach {
    pub fn new(srcdir: FilePath, configs: ConfigSet, runner: Arc<dyn ProcessRunner>) -> Self {
        let command = vec![srcdir.join(["mach"]).to_string()];
        Mach {
            srcdir,
            command,
            configs,
            runner,
        }
    }

    /// Query the build environment.
    pub async fn environment(&self) -> Result<MachEnvironment, MachError> {
        let output = self.exec(&["environment", "--format", "json"]).await?;
        let data = output.join("\n");

        serde_json::from_str(&data).map_err(|err| {
            tracing::error!(%err, %data, "failed to parse mach environment");
            MachError::Json(err)
        })
    }

    /// A snapshot of how we run mach, for diagnostics.
    pub fn state(&self) -> MachState {
        let command_override = MACH_COMMAND.read(&self.configs);
        let environment = match self.environment_overrides() {
            Ok(environment) => environment,
            Err(err) => {
                tracing::warn!(%err, "ignoring invalid mach environment");
                BTreeMap::new()
            }
        };

        MachState {
            command: self.command.clone(),
            command_override: (!command_override.is_empty()).then(|| command_override.to_string()),
            environment,
        }
    }

    /// Runs mach with `args` from the root of the source tree, returning its stdout.
    async fn exec(&self, args: &[&str]) -> Result<Vec<String>, MachError> {
        let mut command = self.command()?;
        command.extend(args.iter().map(|arg| arg.to_string()));

        let invocation = Invocation::new(command)
            .with_cwd(self.srcdir.clone())
            .with_env(self.environment_overrides()?);
        let rendered = invocation.to_string();
        tracing::info!(command = %rendered, "running mach");

        let output = self.runner.run(invocation).await?;
        if !output.success() {
            tracing::error!(command = %rendered, exit_code = output.exit_code, output = ?output.output, "mach failed");
            return Err(MachError::Exit {
                command: rendered,
                exit_code: output.exit_code,
                output: output.output,
            });
        }
        Ok(output.stdout)
    }

    fn command(&self) -> Result<Vec<String>, MachError> {
        let raw = MACH_COMMAND.read(&self.configs);
        let command = mcfg_ore::shell::split(&raw).map_err(|source| MachError::Override {
            setting: MACH_COMMAND.name(),
            source,
        })?;
        if command.is_empty() {
            Ok(self.command.clone())
        } else {
            Ok(command)
        }
    }

    fn environment_overrides(&self) -> Result<BTreeMap<String, String>, MachError> {
        let raw = MACH_ENVIRONMENT.read(&self.configs);
        let entries = mcfg_ore::shell::split(&raw).map_err(|source| MachError::Override {
            setting: MACH_ENVIRONMENT.name(),
            source,
        })?;

        entries
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
                _ => Err(MachError::EnvironmentEntry(entry)),
            })
            .collect()
    }
}

/// Diagnostic summary of a [`Mach`].
#[derive(Debug, Clone, Serialize)]
pub struct MachState {
    pub command: Vec<String>,
    #[serde(rename = "override")]
    pub command_override: Option<String>,
    pub environment: BTreeMap<String, String>,
}
