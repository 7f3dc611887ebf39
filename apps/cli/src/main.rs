//! roomdrop command-line uploader.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roomdrop", version, about = "Resumable file uploads into a room")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, resuming an earlier attempt if there is one
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Room to upload into
        #[arg(long)]
        container: Option<String>,
        /// MIME type (guessed from the extension otherwise)
        #[arg(long)]
        mime: Option<String>,
        /// Server base URL
        #[arg(long)]
        server: Option<String>,
    },
    /// List uploads that can be resumed
    Status,
    /// Forget the recorded upload of a file
    Forget {
        /// Path to the file
        file: PathBuf,
        /// Room the file was uploaded into
        #[arg(long)]
        container: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Upload {
            file,
            container,
            mime,
            server,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let opts = app::UploadOptions {
                container,
                mime,
                server,
            };
            rt.block_on(app::upload(&config, &file, opts))
        }
        Commands::Status => app::status(&config),
        Commands::Forget { file, container } => app::forget(&config, &file, container),
    }
}
