//! storyrun CLI - Main Entry Point
//!
//! Renders every story of a component catalog in a real browser and runs
//! accessibility audits for the stories that configure them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use storyrun_cli::commands::{self, list, open, run, Context, SettingsArgs};
use storyrun_cli::output::{self, print_error, print_help};
use storyrun_common::SETTINGS_FILE;

/// storyrun - render and accessibility smoke tests for catalog stories
#[derive(Parser)]
#[command(name = "storyrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file, relative to the working directory
    #[arg(long, default_value = SETTINGS_FILE, env = "STORYRUN_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every story and audit the ones that configure it
    Run(run::RunArgs),

    /// List the stories discovery finds
    List,

    /// Open a story in a visible browser
    Open(open::OpenArgs),

    /// Mount the docs page of a story file in a visible browser
    Docs(open::DocsArgs),
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    let ctx = Context::load(&cli.config, &cli.settings, cli.format)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, ctx).await,
        Commands::List => list::execute(ctx),
        Commands::Open(args) => open::execute_open(args, ctx).await,
        Commands::Docs(args) => open::execute_docs(args, ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_logging(verbose, cli.log_json);

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            print_error(&err.to_string());
            for hint in commands::help(&err) {
                print_help(&hint);
            }
            if verbose && commands::show_trace(&err) {
                for cause in err.chain().skip(1) {
                    eprintln!("  caused by: {}", cause);
                }
            }
            ExitCode::from(commands::exit_code(&err))
        }
    }
}
