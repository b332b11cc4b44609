use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mcfg_cfg::ConfigSet;
use mcfg_core::{Build, CompileOutcome, CompilerContext};
use mcfg_process::TokioRunner;
use mcfg_types::FilePath;
use tracing_subscriber::EnvFilter;

/// Resolve the compiler configuration of source files in a mach based build.
#[derive(Debug, Parser)]
#[command(name = "mcfg", version)]
struct Args {
    /// TOML file of settings to apply.
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,
    /// Override a single setting, applied after the settings file and environment.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,
    /// Root of the source tree, where `mach` lives.
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the configuration for a source file as JSON.
    Resolve { file: PathBuf },
    /// Compile a source file with the flags the build would use.
    TestCompile { file: PathBuf },
    /// Print every directory headers may be found in.
    IncludePaths,
    /// Print everything we know about the build as JSON.
    State,
    /// Print the current value of every setting.
    Settings,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let configs = load_settings(&args)?;
    if let Command::Settings = args.command {
        print!("{configs}");
        return Ok(());
    }

    let cwd = FilePath::new(std::env::current_dir().context("unknown working directory")?);
    let root = cwd.resolve(&args.root);
    tracing::debug!(%root, command = ?args.command, "starting");
    let context = CompilerContext {
        configs,
        runner: Arc::new(TokioRunner),
    };
    let build = discover(&root, &context).await?;

    match args.command {
        Command::Resolve { file } => {
            let source = cwd.resolve(file);
            let config = build
                .source_configuration(&source)
                .await
                .with_context(|| format!("no configuration available for {source}"))?;
            let json = serde_json::to_string_pretty(&config.to_source_file_configuration())?;
            println!("{json}");
        }
        Command::TestCompile { file } => {
            let source = cwd.resolve(file);
            let outcome = build.test_compile(&source).await;
            let Some(report) = outcome.report(&source) else {
                anyhow::bail!("no configuration available for {source}");
            };
            println!("{}", colorize(&outcome, &report));
            if !matches!(&outcome, CompileOutcome::Finished(output) if output.success()) {
                std::process::exit(1);
            }
        }
        Command::IncludePaths => {
            for path in build.include_paths().iter() {
                println!("{path}");
            }
        }
        Command::State => {
            let json = serde_json::to_string_pretty(&build.state())?;
            println!("{json}");
        }
        Command::Settings => unreachable!("handled above"),
    }

    Ok(())
}

/// Settings from, in increasing priority, defaults, the settings file, `MCFG_*` environment
/// variables, and `--set` arguments.
fn load_settings(args: &Args) -> Result<ConfigSet, anyhow::Error> {
    let mut builder = ConfigSet::builder();
    mcfg_core::cfgs::all_cfgs(&mut builder);
    let configs = builder.build();

    if let Some(path) = &args.settings {
        configs.load_toml_file(path)?;
    }
    configs.load_env()?;
    for setting in &args.set {
        let (name, value) = setting
            .split_once('=')
            .with_context(|| format!("invalid --set '{setting}', expected NAME=VALUE"))?;
        configs.try_update(name.trim(), value)?;
    }

    Ok(configs)
}

async fn discover(root: &FilePath, context: &CompilerContext) -> Result<Build, anyhow::Error> {
    let spinner = ProgressBar::new_spinner().with_message(format!("Discovering build in {root}"));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .expect("known valid template")
            .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]),
    );

    let build = Build::try_create(root, context).await;
    spinner.finish_and_clear();

    build
        .with_context(|| format!("failed to discover the build in {root}"))?
        .with_context(|| format!("no mach found in {root}"))
}

fn colorize(outcome: &CompileOutcome, report: &str) -> String {
    let ansi = std::io::stdout().is_terminal() && !mcfg_ore::env::is_truthy("NO_COLOR");
    if !ansi {
        return report.to_string();
    }

    let (headline, rest) = report.split_once('\n').unwrap_or((report, ""));
    let colour = match outcome {
        CompileOutcome::Finished(output) if output.success() => ansi_term::Colour::Green,
        _ => ansi_term::Colour::Red,
    };
    let headline = colour.bold().paint(headline);
    if rest.is_empty() {
        headline.to_string()
    } else {
        format!("{headline}\n{rest}")
    }
}
