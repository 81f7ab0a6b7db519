mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ump")]
#[command(about = "Umpire CLI - compile, run and judge submissions in sandboxes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run source files from a directory
    Exec {
        /// Directory containing the source files
        dir: PathBuf,

        /// File whose contents become the program's stdin
        stdin_file: Option<PathBuf>,

        /// Programming language of the source file(s)
        #[arg(short = 'L', long = "lang", default_value = "cpp")]
        lang: String,
    },

    /// Scan problem directories and refresh the on-disk catalog cache
    Update {
        /// Discard the existing cache instead of merging into it
        #[arg(short = 'w', long)]
        overwrite: bool,

        /// Problem directories to scan
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// Judge every discovered problem's canonical solution against its own fixtures
    Validate {
        /// Problem directories to scan
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    // Usage errors exit 1 like every other unrecoverable error.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });
    match cli.command {
        Commands::Exec {
            dir,
            stdin_file,
            lang,
        } => commands::exec(&dir, stdin_file.as_deref(), &lang).await?,
        Commands::Update { overwrite, dirs } => commands::update(overwrite, &dirs)?,
        Commands::Validate { dirs } => commands::validate(&dirs).await?,
    }
    Ok(())
}
