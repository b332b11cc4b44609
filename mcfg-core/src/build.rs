//! A build we can resolve source file configurations for.

use mcfg_compiler::{Compiler, CompilerContext, CompilerError, CompilerState};
use mcfg_fragment::{Fragment, FragmentError};
use mcfg_process::ProcessOutput;
use mcfg_types::{CompileConfig, FilePath, FilePathSet, SourceLanguage};
use serde::Serialize;

use crate::mach::{Mach, MachEnvironment, MachError, MachState};

/// Name of the per-directory fragment holding compiler flags.
static BACKEND_FRAGMENT: &str = "backend.mk";

/// Headers the build makes available to every directory, relative to the object directory.
static OBJDIR_INCLUDES: &[&[&str]] = &[
    &["dist", "include"],
    &["dist", "include", "nss"],
    &["dist", "include", "nspr"],
    &["ipc", "ipdl", "_ipdlheaders"],
];

/// Reasons a source tree with a `mach` couldn't be turned into a [`Build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Mach(#[from] MachError),
    #[error("mach reported topsrcdir {reported}, expected {root}")]
    Mismatch { root: FilePath, reported: FilePath },
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("no {key} found in {path}")]
    MissingCompiler { key: &'static str, path: FilePath },
    #[error(transparent)]
    Compiler(#[from] CompilerError),
}

/// The result of compiling a file for real.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The build has no flags for the file.
    Unconfigured,
    /// The compiler ran, successfully or not.
    Finished(ProcessOutput),
    /// We were unable to run the compiler.
    Error(String),
}

impl CompileOutcome {
    /// A human readable report of compiling `source`, `None` if nothing was compiled.
    pub fn report(&self, source: &FilePath) -> Option<String> {
        let output = match self {
            CompileOutcome::Unconfigured => return None,
            CompileOutcome::Error(err) => return Some(format!("Compiling {source} failed: {err}")),
            CompileOutcome::Finished(output) => output,
        };

        let mut report = if output.success() {
            format!("Compiling {source} succeeded:")
        } else {
            format!(
                "Compiling {source} failed with exit code {}:",
                output.exit_code
            )
        };
        for line in &output.output {
            report.push('\n');
            report.push_str(line);
        }
        Some(report)
    }
}

/// A build system we understand.
#[derive(Debug)]
pub enum Build {
    /// The classic make based build, with flags recorded in a `backend.mk` per directory.
    RecursiveMake(RecursiveMake),
}

impl Build {
    /// Discover the build rooted at `root`.
    ///
    /// Returns `None` when there is no build there, or it couldn't be understood. Failures
    /// are logged, see [`Build::try_create`] for the reason.
    pub async fn create(root: &FilePath, context: &CompilerContext) -> Option<Build> {
        match Build::try_create(root, context).await {
            Ok(build) => build,
            Err(err) => {
                tracing::error!(%root, %err, "failed to discover build");
                None
            }
        }
    }

    /// Discover the build rooted at `root`.
    ///
    /// Returns `Ok(None)` when `root` doesn't contain a `mach`.
    pub async fn try_create(
        root: &FilePath,
        context: &CompilerContext,
    ) -> Result<Option<Build>, BuildError> {
        let mach_path = root.join(["mach"]);
        match tokio::fs::metadata(mach_path.as_path()).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                tracing::debug!(%root, "no mach found");
                return Ok(None);
            }
        }

        let mach = Mach::new(root.clone(), context.configs.clone(), context.runner.clone());
        let environment = mach.environment().await?;
        let reported = FilePath::from_unixy(&environment.topsrcdir);
        if &reported != root {
            tracing::error!(%root, %reported, "mach environment contained unexpected topsrcdir");
            return Err(BuildError::Mismatch {
                root: root.clone(),
                reported,
            });
        }

        let build = RecursiveMake::create(mach, root.clone(), environment, context).await?;
        tracing::info!(%root, objdir = %build.objdir, "discovered build");

        Ok(Some(Build::RecursiveMake(build)))
    }

    /// The configuration to use for `source`, `None` if the build has none.
    pub async fn source_configuration(&self, source: &FilePath) -> Option<CompileConfig> {
        match self {
            Build::RecursiveMake(build) => build.source_configuration(source).await,
        }
    }

    /// Compile `source` with the flags the build would use and report how it went.
    pub async fn test_compile(&self, source: &FilePath) -> CompileOutcome {
        match self {
            Build::RecursiveMake(build) => build.test_compile(source).await,
        }
    }

    /// Every directory headers may be found in.
    pub fn include_paths(&self) -> FilePathSet {
        match self {
            Build::RecursiveMake(build) => build.include_paths(),
        }
    }

    pub fn src_dir(&self) -> &FilePath {
        match self {
            Build::RecursiveMake(build) => &build.srcdir,
        }
    }

    pub fn obj_dir(&self) -> &FilePath {
        match self {
            Build::RecursiveMake(build) => &build.objdir,
        }
    }

    /// A snapshot of this build, for diagnostics.
    pub fn state(&self) -> BuildState {
        match self {
            Build::RecursiveMake(build) => build.state(),
        }
    }
}

/// A make based build.
#[derive(Debug)]
pub struct RecursiveMake {
    mach: Mach,
    environment: MachEnvironment,
    srcdir: FilePath,
    objdir: FilePath,
    c_compiler: Compiler,
    cpp_compiler: Compiler,
}

impl RecursiveMake {
    async fn create(
        mach: Mach,
        srcdir: FilePath,
        environment: MachEnvironment,
        context: &CompilerContext,
    ) -> Result<RecursiveMake, BuildError> {
        let objdir = FilePath::from_unixy(&environment.topobjdir);
        let autoconf = objdir.join(["config", "autoconf.mk"]);
        let base = Fragment::read(&autoconf).await?;

        let compiler_command = |key: &'static str| match base.get_nonempty(key) {
            Some(path) => Ok(vec![FilePath::from_unixy(path).to_string()]),
            None => {
                tracing::error!(%key, path = %autoconf, "no compiler found");
                Err(BuildError::MissingCompiler {
                    key,
                    path: autoconf.clone(),
                })
            }
        };
        let c_command = compiler_command("_CC")?;
        let cpp_command = compiler_command("_CXX")?;

        let (c_compiler, cpp_compiler) = futures::try_join!(
            Compiler::create(context, c_command, SourceLanguage::C, &base),
            Compiler::create(context, cpp_command, SourceLanguage::Cpp, &base),
        )?;

        Ok(RecursiveMake {
            mach,
            environment,
            srcdir,
            objdir,
            c_compiler,
            cpp_compiler,
        })
    }

    async fn source_configuration(&self, source: &FilePath) -> Option<CompileConfig> {
        let (compiler, base_dir, args) = self.directory_flags(source).await?;
        Some(compiler.resolve_configuration(&args, &base_dir))
    }

    async fn test_compile(&self, source: &FilePath) -> CompileOutcome {
        let Some((compiler, base_dir, args)) = self.directory_flags(source).await else {
            tracing::info!(%source, "no configuration to test compile with");
            return CompileOutcome::Unconfigured;
        };
        let config = compiler.resolve_configuration(&args, &base_dir);

        let outcome = match compiler.compile(&config, source).await {
            Ok(output) => CompileOutcome::Finished(output),
            Err(err) => CompileOutcome::Error(err.to_string()),
        };
        if let Some(report) = outcome.report(source) {
            match &outcome {
                CompileOutcome::Finished(output) if output.success() => {
                    tracing::info!("{report}")
                }
                _ => tracing::warn!("{report}"),
            }
        }
        outcome
    }

    fn include_paths(&self) -> FilePathSet {
        let mut paths = FilePathSet::new();
        paths.insert(self.srcdir.clone());
        for components in OBJDIR_INCLUDES {
            paths.insert(self.objdir.join(components.iter()));
        }
        paths.extend(self.c_compiler.include_paths().iter());
        paths.extend(self.cpp_compiler.include_paths().iter());
        paths
    }

    fn state(&self) -> BuildState {
        BuildState {
            srcdir: self.srcdir.clone(),
            objdir: self.objdir.clone(),
            mach: self.mach.state(),
            environment: self.environment.clone(),
            c_compiler: self.c_compiler.state(),
            cpp_compiler: self.cpp_compiler.state(),
        }
    }

    /// Which compiler the build uses for `source`.
    async fn source_language(&self, source: &FilePath) -> SourceLanguage {
        match source.extension() {
            Some("c") => SourceLanguage::C,
            Some("h") if is_file(&source.with_extension("c")).await => SourceLanguage::C,
            _ => SourceLanguage::Cpp,
        }
    }

    /// The compiler, working directory and arguments the build uses for `source`.
    async fn directory_flags(&self, source: &FilePath) -> Option<(&Compiler, FilePath, Vec<String>)> {
        let language = self.source_language(source).await;
        let compiler = match language {
            SourceLanguage::C => &self.c_compiler,
            SourceLanguage::Cpp => &self.cpp_compiler,
        };

        let Some(dir) = source.parent().rebase(&self.srcdir, &self.objdir) else {
            tracing::debug!(%source, srcdir = %self.srcdir, "file is outside of the source tree");
            return None;
        };
        let backend = dir.join([BACKEND_FRAGMENT]);
        let fragment = match Fragment::read(&backend).await {
            Ok(fragment) => fragment,
            Err(err) => {
                tracing::debug!(%source, %err, "no build configuration for directory");
                return None;
            }
        };

        let variable = language.flags_variable();
        let Some(flags) = fragment.get_nonempty(variable) else {
            tracing::debug!(%source, %variable, path = %backend, "no flags for source");
            return None;
        };
        match mcfg_ore::shell::split(flags) {
            Ok(args) => Some((compiler, dir, args)),
            Err(err) => {
                tracing::warn!(%source, %variable, %err, "unable to parse compiler flags");
                None
            }
        }
    }
}

async fn is_file(path: &FilePath) -> bool {
    tokio::fs::metadata(path.as_path())
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// Diagnostic summary of a [`Build`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildState {
    pub srcdir: FilePath,
    pub objdir: FilePath,
    pub mach: MachState,
    pub environment: MachEnvironment,
    pub c_compiler: CompilerState,
    pub cpp_compiler: CompilerState,
}
