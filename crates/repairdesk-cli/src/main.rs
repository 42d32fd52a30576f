mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    card::CardSubcommand,
    report::ReportSubcommand,
    settings::SettingsSubcommand,
    stage::{PrioritySubcommand, StageSubcommand},
    webhook::WebhookSubcommand,
    ChannelArgs,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "repairdesk",
    about = "Service-centre board: ingest repair requests from chat, track them through the workflow, report progress",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data root (default: auto-detect from .repairdesk/)
    #[arg(long, global = true, env = "REPAIRDESK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Who is making manual changes (recorded in card history)
    #[arg(long, global = true, env = "REPAIRDESK_ACTOR", default_value = "operator")]
    actor: String,

    #[command(flatten)]
    channel: ChannelArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory with the default workflow, tiers and settings
    Init,

    /// Run the HTTP API, webhook endpoint and report loop
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "3000")]
        port: u16,

        /// Seconds between report scheduler passes
        #[arg(long, default_value = "60")]
        report_tick_secs: u64,
    },

    /// Parse a request message (file or stdin) and print the extracted fields
    Parse {
        /// Message file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Inspect and manage cards
    Card {
        #[command(subcommand)]
        subcommand: CardSubcommand,
    },

    /// Configure workflow stages (board columns)
    Stage {
        #[command(subcommand)]
        subcommand: StageSubcommand,
    },

    /// Configure priority tiers
    Priority {
        #[command(subcommand)]
        subcommand: PrioritySubcommand,
    },

    /// Build or send progress reports
    Report {
        #[command(subcommand)]
        subcommand: ReportSubcommand,
    },

    /// Read and change runtime settings
    Settings {
        #[command(subcommand)]
        subcommand: SettingsSubcommand,
    },

    /// Manage the Telegram webhook registration
    Webhook {
        #[command(subcommand)]
        subcommand: WebhookSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Serve {
            port,
            report_tick_secs,
        } => cmd::serve::run(&root, port, report_tick_secs, &cli.channel),
        Commands::Parse { file } => cmd::parse::run(file.as_deref(), cli.json),
        Commands::Card { subcommand } => {
            cmd::card::run(&root, subcommand, &cli.actor, &cli.channel, cli.json)
        }
        Commands::Stage { subcommand } => cmd::stage::run_stage(&root, subcommand, cli.json),
        Commands::Priority { subcommand } => {
            cmd::stage::run_priority(&root, subcommand, cli.json)
        }
        Commands::Report { subcommand } => {
            cmd::report::run(&root, subcommand, &cli.channel, cli.json)
        }
        Commands::Settings { subcommand } => cmd::settings::run(&root, subcommand, cli.json),
        Commands::Webhook { subcommand } => cmd::webhook::run(subcommand, &cli.channel, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
