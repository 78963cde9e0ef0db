//! cybertutor CLI: the learner- and author-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use cybertutor_core::model::ContentFormat;

mod commands;

use commands::SessionOptions;

#[derive(Parser)]
#[command(name = "cybertutor", version, about = "Adaptive cybersecurity tutor")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data file (overrides `data_file` from the config)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Seed for group assignment and question selection
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and sample catalog
    Init,

    /// Validate catalog TOML files
    Validate {
        /// Path to a catalog file or directory
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Create a learner account
    Register {
        /// Display name
        #[arg(long)]
        name: String,

        /// Account id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Preferred content format: text or video
        #[arg(long, default_value = "text")]
        preference: ContentFormat,

        /// Request content-author rights (only while no author exists)
        #[arg(long)]
        superuser: bool,
    },

    /// Import a catalog into the store
    Import {
        /// Path to a catalog file or directory
        #[arg(long)]
        catalog: PathBuf,

        /// Author performing the import
        #[arg(long = "as")]
        as_user: String,
    },

    /// Classify a learner from survey answers
    Survey {
        #[arg(long)]
        user: String,

        /// TOML file with `[[responses]]` question/answer pairs
        #[arg(long)]
        responses: PathBuf,
    },

    /// Take a chapter assessment, reading one answer per line from stdin
    Quiz {
        #[arg(long)]
        user: String,

        #[arg(long)]
        chapter: String,
    },

    /// Show where "next chapter" leads
    Next {
        #[arg(long)]
        user: String,

        #[arg(long)]
        chapter: String,
    },

    /// Display a chapter
    Show {
        #[arg(long)]
        user: String,

        #[arg(long)]
        chapter: String,
    },

    /// Per-topic progress table
    Progress {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cybertutor=info")),
        )
        .init();

    let cli = Cli::parse();
    let options = SessionOptions {
        config: cli.config,
        data: cli.data,
        seed: cli.seed,
    };

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::Register {
            name,
            id,
            preference,
            superuser,
        } => commands::register::execute(&options, name, id, preference, superuser).await,
        Commands::Import { catalog, as_user } => {
            commands::import::execute(&options, catalog, as_user).await
        }
        Commands::Survey { user, responses } => {
            commands::survey::execute(&options, user, responses).await
        }
        Commands::Quiz { user, chapter } => commands::quiz::execute(&options, user, chapter).await,
        Commands::Next { user, chapter } => commands::next::execute(&options, user, chapter).await,
        Commands::Show { user, chapter } => commands::show::execute(&options, user, chapter).await,
        Commands::Progress { user } => commands::progress::execute(&options, user).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
