use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reportforge::ExecutionMode;
use reportforge::cli::commands::generate::{GenerateOptions, RunOutcome};

#[derive(Parser)]
#[command(name = "reportforge")]
#[command(
    version,
    about = "Segmented multi-chapter report generation with resumable caching"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the report pipeline
    Generate {
        #[arg(long, short, help = "Report plan file (default: paths.plan_file)")]
        plan: Option<PathBuf>,
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, help = "Service API key")]
        api_key: Option<String>,
        #[arg(long, short, help = "Output directory for the document")]
        output: Option<PathBuf>,
        #[arg(long, conflicts_with = "assemble_only", help = "Reuse cached fragments")]
        resume: bool,
        #[arg(long, help = "Rebuild from cache only, without network access")]
        assemble_only: bool,
    },

    /// Show which steps of the plan are materialized
    Status {
        #[arg(long, short, help = "Report plan file (default: paths.plan_file)")]
        plan: Option<PathBuf>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Inspect or clear cached fragments
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached fragments
    List,
    /// Print one cached fragment
    Show {
        #[arg(help = "Cache key, e.g. ch1_a_context")]
        key: String,
    },
    /// Remove every cached fragment
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize project configuration and a sample plan
    Init {
        #[arg(long, help = "Overwrite existing files")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mReportForge encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Generate {
            plan,
            api_key,
            output,
            resume,
            assemble_only,
        } => {
            let mode = if assemble_only {
                ExecutionMode::AssembleOnly
            } else if resume {
                ExecutionMode::Resume
            } else {
                ExecutionMode::Generate
            };

            let rt = Runtime::new()?;
            let outcome = rt.block_on(reportforge::cli::commands::generate::run(
                GenerateOptions {
                    plan,
                    api_key,
                    mode,
                    output,
                },
            ))?;

            return Ok(match outcome {
                RunOutcome::Done => ExitCode::SUCCESS,
                RunOutcome::Cancelled => ExitCode::from(130),
                RunOutcome::Failed => ExitCode::FAILURE,
            });
        }
        Commands::Status { plan, format } => {
            let rt = Runtime::new()?;
            rt.block_on(reportforge::cli::commands::status::run(plan, &format))?;
        }
        Commands::Cache { action } => {
            let rt = Runtime::new()?;
            match action {
                CacheAction::List => rt.block_on(reportforge::cli::commands::cache::list())?,
                CacheAction::Show { key } => {
                    rt.block_on(reportforge::cli::commands::cache::show(&key))?
                }
                CacheAction::Clear => rt.block_on(reportforge::cli::commands::cache::clear())?,
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                reportforge::cli::commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                reportforge::cli::commands::config::path()?;
            }
            ConfigAction::Init { force } => {
                reportforge::cli::commands::config::init(force)?;
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
