use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use derivative::Derivative;
use mcfg_cfg::{Config, ConfigSet};
use mcfg_fragment::Fragment;
use mcfg_ore::shell::ShellParseError;
use mcfg_process::{Invocation, ProcessError, ProcessOutput, ProcessRunner};
use mcfg_types::{CompileConfig, FilePath, FilePathSet, IntelliSenseMode, SourceLanguage};
use serde::Serialize;

use crate::args::apply_arguments;
use crate::defaults::DiscoveredDefaults;

pub static C_COMPILER_COMMAND: Config<&'static str> = Config::new(
    "c_compiler_command",
    "Shell quoted command to run instead of the C compiler the build was configured with.",
    "",
);

pub static CPP_COMPILER_COMMAND: Config<&'static str> = Config::new(
    "cpp_compiler_command",
    "Shell quoted command to run instead of the C++ compiler the build was configured with.",
    "",
);

#[cfg(windows)]
static NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
static NULL_DEVICE: &str = "/dev/null";

/// Errors from discovering or running a compiler.
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error("CC_TYPE is not set, unable to determine the compiler type")]
    MissingType,
    #[error("{0} compiler is currently not supported")]
    Unsupported(CompactString),
    #[error("unknown compiler type '{0}'")]
    UnknownType(CompactString),
    #[error("test compiling is not yet supported with {0}")]
    CompileUnsupported(CompilerFamily),
    #[error("invalid '{setting}' setting: {source}")]
    Override {
        setting: &'static str,
        #[source]
        source: ShellParseError,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("'{command}' exited with code {exit_code} while discovering defaults")]
    DiscoveryExit {
        command: String,
        exit_code: i32,
        output: Vec<String>,
    },
    #[error("no defines were discovered from '{command}'")]
    NoDefines { command: String },
}

/// The compiler families we know how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompilerFamily {
    /// `clang` and anything else that accepts GCC style arguments.
    #[serde(rename = "clang")]
    Clang,
    /// `clang-cl`, Clang with an MSVC compatible command line.
    #[serde(rename = "clang-cl")]
    Msvc,
}

impl CompilerFamily {
    /// Classify the value of the build's `CC_TYPE` variable.
    pub fn from_cc_type(cc_type: &str) -> Result<CompilerFamily, CompilerError> {
        match cc_type {
            "clang" => Ok(CompilerFamily::Clang),
            "clang-cl" => Ok(CompilerFamily::Msvc),
            "msvc" => Err(CompilerError::Unsupported(cc_type.into())),
            other => Err(CompilerError::UnknownType(other.into())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Clang => "clang",
            CompilerFamily::Msvc => "clang-cl",
        }
    }

    /// Argument that makes the next argument a header included before the source.
    pub fn forced_include_flag(&self) -> &'static str {
        match self {
            CompilerFamily::Clang => "-include",
            CompilerFamily::Msvc => "-FI",
        }
    }

    pub fn intellisense_mode(&self) -> IntelliSenseMode {
        IntelliSenseMode::ClangX64
    }

    /// Arguments selecting the language and standard we discover defaults for.
    fn language_args(&self, language: SourceLanguage) -> [&'static str; 2] {
        match (self, language) {
            (CompilerFamily::Clang, SourceLanguage::C) => ["-std=gnu99", "-xc"],
            (CompilerFamily::Clang, SourceLanguage::Cpp) => ["-std=c++14", "-xc++"],
            (CompilerFamily::Msvc, SourceLanguage::C) => ["-std:gnu99", "-TC"],
            (CompilerFamily::Msvc, SourceLanguage::Cpp) => ["-std:c++14", "-TP"],
        }
    }

    /// Arguments that make the compiler print its search paths and predefined macros.
    fn diagnostic_args(&self) -> &'static [&'static str] {
        match self {
            CompilerFamily::Clang => &["-Wp,-v", "-E", "-dD"],
            CompilerFamily::Msvc => &["-v", "-E", "-Xclang", "-dM"],
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handles every [`Compiler`] is created with.
#[derive(Clone, Debug)]
pub struct CompilerContext {
    /// Live settings, read for command overrides.
    pub configs: ConfigSet,
    /// How we run the compiler.
    pub runner: Arc<dyn ProcessRunner>,
}

/// A compiler for one language, and the configuration it uses when given no arguments.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Compiler {
    family: CompilerFamily,
    language: SourceLanguage,
    /// Command the build invokes this compiler with.
    command: Vec<String>,
    /// What the compiler does without any arguments, never modified after discovery.
    defaults: Arc<CompileConfig>,

    #[derivative(Debug = "ignore")]
    configs: ConfigSet,
    #[derivative(Debug = "ignore")]
    runner: Arc<dyn ProcessRunner>,
}

impl Compiler {
    /// Discover the compiler the build uses for `language`.
    ///
    /// `command` is how the build invokes the compiler and `base` is the build's top level
    /// configuration, which tells us the compiler family and on macOS the SDK.
    pub async fn create(
        context: &CompilerContext,
        command: Vec<String>,
        language: SourceLanguage,
        base: &Fragment,
    ) -> Result<Compiler, CompilerError> {
        let cc_type = base
            .get_nonempty("CC_TYPE")
            .ok_or(CompilerError::MissingType)?;
        let family = CompilerFamily::from_cc_type(cc_type)?;

        let sdk = discovery_sdk(base, cfg!(target_os = "macos"));

        let command_override = read_override(&context.configs, language)?;
        let program = command_override
            .clone()
            .unwrap_or_else(|| command.clone());
        let discovery = discovery_command(program, family, language, sdk.as_ref());

        let invocation = Invocation::new(discovery);
        let rendered = invocation.to_string();
        tracing::info!(%family, %language, command = %rendered, "discovering compiler defaults");

        let output = context.runner.run(invocation).await?;
        if !output.success() {
            tracing::error!(command = %rendered, exit_code = output.exit_code, "compiler discovery failed");
            return Err(CompilerError::DiscoveryExit {
                command: rendered,
                exit_code: output.exit_code,
                output: output.output,
            });
        }

        let mut defaults = CompileConfig::new(language.standard(), family.intellisense_mode());
        DiscoveredDefaults::parse(&output.output).apply_to(&mut defaults);
        defaults.macos_sdk = sdk;
        defaults.compiler_path = command_override
            .as_ref()
            .and_then(|command| command.first())
            .map(FilePath::new);

        if defaults.defines.is_empty() && defaults.compiler_path.is_none() {
            tracing::error!(command = %rendered, output = ?output.output, "compiler reported no defines");
            return Err(CompilerError::NoDefines { command: rendered });
        }
        tracing::debug!(
            %language,
            includes = defaults.includes.len(),
            sys_includes = defaults.sys_includes.len(),
            framework_includes = defaults.framework_includes.len(),
            defines = defaults.defines.len(),
            "discovered compiler defaults",
        );

        Ok(Compiler {
            family,
            language,
            command,
            defaults: Arc::new(defaults),
            configs: context.configs.clone(),
            runner: Arc::clone(&context.runner),
        })
    }

    pub fn family(&self) -> CompilerFamily {
        self.family
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    /// A copy of the configuration the compiler uses without any arguments.
    pub fn default_configuration(&self) -> CompileConfig {
        CompileConfig::clone(&self.defaults)
    }

    /// The configuration this compiler uses when invoked with `args` from `base_dir`.
    pub fn resolve_configuration<S: AsRef<str>>(
        &self,
        args: &[S],
        base_dir: &FilePath,
    ) -> CompileConfig {
        let mut config = self.default_configuration();
        apply_arguments(
            args,
            self.family.forced_include_flag(),
            base_dir,
            &mut config,
        );
        config
    }

    /// Every directory this compiler searches for headers by default.
    pub fn include_paths(&self) -> FilePathSet {
        let mut paths = FilePathSet::new();
        paths.extend(self.defaults.sys_includes.iter());
        paths.extend(self.defaults.framework_includes.iter());
        paths.extend(self.defaults.includes.iter());
        paths
    }

    /// Compile `source` with `config`, discarding the object file.
    ///
    /// The compiler exiting with a non-zero status is a normal result, not an error.
    pub async fn compile(
        &self,
        config: &CompileConfig,
        source: &FilePath,
    ) -> Result<ProcessOutput, CompilerError> {
        if self.family == CompilerFamily::Msvc {
            return Err(CompilerError::CompileUnsupported(self.family));
        }

        let mut command = self.command()?;
        if let Some(sdk) = &config.macos_sdk {
            command.push("-isysroot".to_string());
            command.push(sdk.to_string());
        }
        command.extend(
            ["-nobuiltininc", "-undef", "-c", "-Wno-everything", "-o", NULL_DEVICE]
                .map(String::from),
        );
        command.extend(config.sys_includes.iter().map(|p| format!("-isystem{p}")));
        command.extend(
            config
                .framework_includes
                .iter()
                .map(|p| format!("-iframework{p}")),
        );
        command.extend(config.defines.iter().map(|d| format!("-D{d}")));
        command.extend(config.includes.iter().map(|p| format!("-I{p}")));
        for include in config.forced_includes.iter() {
            command.push("-include".to_string());
            command.push(include.to_string());
        }
        command.push(source.to_string());

        let invocation = Invocation::new(command).with_cwd(source.parent());
        tracing::info!(%source, command = %invocation, "test compiling");
        let output = self.runner.run(invocation).await?;

        Ok(output)
    }

    /// A snapshot of this compiler for diagnostics.
    pub fn state(&self) -> CompilerState {
        let setting = setting_for(self.language);
        let command_override = setting.read(&self.configs);
        let command_override = (!command_override.is_empty()).then(|| command_override.to_string());

        CompilerState {
            family: self.family,
            language: self.language,
            command: self.command.clone(),
            command_override,
            includes: self.defaults.includes.clone(),
            sys_includes: self.defaults.sys_includes.clone(),
            framework_includes: self.defaults.framework_includes.clone(),
            defines: self.defaults.defines.len(),
        }
    }

    /// The command to invoke the compiler with, honoring any override set right now.
    fn command(&self) -> Result<Vec<String>, CompilerError> {
        let command_override = read_override(&self.configs, self.language)?;
        Ok(command_override.unwrap_or_else(|| self.command.clone()))
    }
}

/// Diagnostic summary of a [`Compiler`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerState {
    #[serde(rename = "type")]
    pub family: CompilerFamily,
    pub language: SourceLanguage,
    pub command: Vec<String>,
    #[serde(rename = "override")]
    pub command_override: Option<String>,
    pub includes: FilePathSet,
    pub sys_includes: FilePathSet,
    #[serde(rename = "osxFrameworkIncludes")]
    pub framework_includes: FilePathSet,
    /// Number of discovered defines.
    pub defines: usize,
}

/// The SDK the build compiles against, only meaningful when targeting macOS.
fn discovery_sdk(base: &Fragment, is_macos: bool) -> Option<FilePath> {
    if !is_macos {
        return None;
    }
    base.get_nonempty("MACOS_SDK_DIR").map(FilePath::new)
}

/// `program` with the arguments that make it describe its defaults for `language`.
fn discovery_command(
    mut program: Vec<String>,
    family: CompilerFamily,
    language: SourceLanguage,
    sdk: Option<&FilePath>,
) -> Vec<String> {
    program.extend(family.language_args(language).map(String::from));
    if let (CompilerFamily::Clang, Some(sdk)) = (family, sdk) {
        program.push("-isysroot".to_string());
        program.push(sdk.to_string());
    }
    program.extend(family.diagnostic_args().iter().map(|arg| arg.to_string()));
    program.push(NULL_DEVICE.to_string());
    program
}

fn setting_for(language: SourceLanguage) -> &'static Config<&'static str> {
    match language {
        SourceLanguage::C => &C_COMPILER_COMMAND,
        SourceLanguage::Cpp => &CPP_COMPILER_COMMAND,
    }
}

/// Reads the user's command override for `language`, `None` if it isn't set.
fn read_override(
    configs: &ConfigSet,
    language: SourceLanguage,
) -> Result<Option<Vec<String>>, CompilerError> {
    let setting = setting_for(language);
    let raw = setting.read(configs);
    let command = mcfg_ore::shell::split(&raw).map_err(|source| CompilerError::Override {
        setting: setting.name(),
        source,
    })?;
    Ok((!command.is_empty()).then_some(command))
}

#[cfg(all(test, unix))]
mod tests;
