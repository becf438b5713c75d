use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use siteforge::commands::{
    create_job, download_archive, edit_job, init_project, run_worker, show_status, team_add,
    team_credit, team_show, CreateOptions, EditOptions, WorkOptions,
};
use siteforge::models::{ModelTier, OutputKind};

/// SiteForge - provider-backed website generation jobs with team billing
#[derive(Parser)]
#[command(name = "siteforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a SiteForge project
    Init {
        /// Project directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Manage team accounts and balances
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },

    /// Create a generation job (reserves the price, no generation yet)
    Create {
        /// What to build
        #[arg(long)]
        prompt: String,

        /// Team account to bill
        #[arg(long)]
        team: String,

        /// Requesting user
        #[arg(long, default_value = "cli")]
        owner: String,

        /// Language of the generated content
        #[arg(long, default_value = "en")]
        language: String,

        /// Model capability tier
        #[arg(long, value_enum, default_value = "standard")]
        tier: ModelTier,

        /// Kind of site to generate
        #[arg(long = "kind", value_enum, default_value = "website")]
        output_kind: OutputKind,

        /// Optional layout guidance
        #[arg(long)]
        layout: Option<String>,

        /// Optional site name
        #[arg(long)]
        site_name: Option<String>,
    },

    /// Claim and run pending jobs
    Work {
        /// Specific job ID to run
        #[arg(short, long)]
        job: Option<String>,

        /// Maximum concurrent jobs (0 = unlimited)
        #[arg(long, default_value = "4")]
        max_concurrent: usize,

        /// Override the provider base URL
        #[arg(long)]
        url: Option<String>,

        /// Override the provider timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Rework a completed job's output
    Edit {
        /// Job ID to edit
        #[arg(short, long)]
        job: String,

        /// The change to apply
        #[arg(long)]
        request: String,

        /// Limit the change to these files (repeatable)
        #[arg(long = "scope")]
        scope: Vec<String>,
    },

    /// Show job status
    Status {
        /// Specific job ID
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Write a completed job's archive to disk
    Download {
        /// Job ID
        #[arg(short, long)]
        job: String,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum TeamAction {
    /// Create a team account
    Add {
        /// Team ID
        id: String,

        /// How far below zero the balance may go, in cents
        #[arg(long, default_value = "0")]
        credit_limit: i64,
    },

    /// Fund a team (negative amounts correct the balance downward)
    Credit {
        /// Team ID
        id: String,

        /// Amount in cents
        #[arg(long)]
        cents: i64,

        /// Note recorded on the transaction
        #[arg(long)]
        note: Option<String>,

        /// Acting user recorded on the transaction
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Show a team's balance and transaction history
    Show {
        /// Team ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let result = match cli.command {
        Commands::Init { path } => {
            let root = path.unwrap_or(project_root);
            init_project(&root)
        }

        Commands::Team { action } => match action {
            TeamAction::Add { id, credit_limit } => team_add(&project_root, &id, credit_limit),
            TeamAction::Credit {
                id,
                cents,
                note,
                actor,
            } => team_credit(&project_root, &id, cents, note.as_deref(), &actor),
            TeamAction::Show { id } => team_show(&project_root, &id),
        },

        Commands::Create {
            prompt,
            team,
            owner,
            language,
            tier,
            output_kind,
            layout,
            site_name,
        } => create_job(
            &project_root,
            CreateOptions {
                prompt,
                team,
                owner,
                language,
                tier,
                output_kind,
                layout,
                site_name,
            },
        ),

        Commands::Work {
            job,
            max_concurrent,
            url,
            timeout,
        } => {
            run_worker(
                &project_root,
                WorkOptions {
                    job_id: job,
                    max_concurrent,
                    url,
                    timeout,
                },
            )
            .await
        }

        Commands::Edit {
            job,
            request,
            scope,
        } => {
            edit_job(
                &project_root,
                EditOptions {
                    job_id: job,
                    request,
                    scope,
                },
            )
            .await
        }

        Commands::Status { job } => show_status(&project_root, job.as_deref(), cli.verbose),

        Commands::Download { job, out } => download_archive(&project_root, &job, &out),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
