//! pkgpulse command-line interface.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

#[derive(Parser)]
#[command(
    name = "pkgpulse",
    version,
    about = "Continuous multi-ecosystem open-source package risk analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory for analysis artifacts (PKGPULSE_DATA_DIR overrides).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List top packages from an ecosystem
    List {
        /// Package ecosystem (npm, pypi, homebrew)
        #[arg(default_value = "homebrew")]
        ecosystem: String,
        /// Number of packages to list
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Fetch and print metadata for one package
    Fetch {
        /// Package name
        package: String,
        /// Package ecosystem
        #[arg(short, long, default_value = "homebrew")]
        ecosystem: String,
        /// Also fetch repository data
        #[arg(short, long)]
        github: bool,
    },

    /// Run the full analysis on one package
    Analyze {
        /// Package name
        package: String,
        /// Package ecosystem
        #[arg(short, long, default_value = "homebrew")]
        ecosystem: String,
        /// Enable LLM assessments
        #[arg(long)]
        with_llm: bool,
    },

    /// Analyze the top packages of an ecosystem
    AnalyzeBatch {
        /// Package ecosystem
        #[arg(short, long, default_value = "homebrew")]
        ecosystem: String,
        /// Number of packages to analyze
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: usize,
        /// Enable LLM assessments
        #[arg(long)]
        with_llm: bool,
    },

    /// Print the live metrics snapshot
    Monitor,

    /// Run the continuous analysis daemon
    Daemon {
        /// Enable LLM assessments
        #[arg(long)]
        with_llm: bool,
        /// Run LLM assessments in parallel
        #[arg(long)]
        parallel_llm: bool,
        /// Days before an analysis is considered stale
        #[arg(long, default_value_t = 7)]
        stale_days: i64,
        /// Disable periodic publication
        #[arg(long)]
        no_publish: bool,
        /// Packages between publications
        #[arg(long, default_value_t = 50)]
        publish_interval: u64,
    },
}

fn data_dir(cli_dir: Option<PathBuf>) -> PathBuf {
    cli_dir
        .or_else(|| std::env::var("PKGPULSE_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pkgpulse=info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = data_dir(cli.data_dir);

    let result: Result<()> = match cli.command {
        Commands::List { ecosystem, limit } => commands::list_packages(&ecosystem, limit).await,
        Commands::Fetch {
            package,
            ecosystem,
            github,
        } => commands::fetch_package(&package, &ecosystem, github).await,
        Commands::Analyze {
            package,
            ecosystem,
            with_llm,
        } => commands::analyze_package(&package, &ecosystem, &data_dir, !with_llm).await,
        Commands::AnalyzeBatch {
            ecosystem,
            limit,
            with_llm,
        } => commands::analyze_batch(&ecosystem, limit, &data_dir, !with_llm).await,
        Commands::Monitor => commands::monitor(&data_dir),
        Commands::Daemon {
            with_llm,
            parallel_llm,
            stale_days,
            no_publish,
            publish_interval,
        } => {
            commands::run_daemon(
                &data_dir,
                with_llm,
                parallel_llm,
                stale_days,
                no_publish,
                publish_interval,
            )
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
