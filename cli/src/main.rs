mod cloud;
mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::cloud::HttpDatabase;
use crate::commands::{
    cmd_calendar, cmd_delete, cmd_goal_set, cmd_goal_show, cmd_history, cmd_log,
    cmd_message_add, cmd_message_delete, cmd_message_edit, cmd_message_list, cmd_message_random,
    cmd_show, cmd_sync,
};
use crate::config::Config;
use calgrid_core::db::Database;
use calgrid_core::local::shared;
use calgrid_core::remote::RemoteDatabase;
use calgrid_core::service::{CalgridService, MessageMode};

#[derive(Parser)]
#[command(
    name = "calgrid",
    version,
    about = "A calorie calendar that colours each day by how far it landed over your goal"
)]
struct Cli {
    /// Document store to sync with (a `calgrid serve` URL)
    #[arg(long, global = true, env = "CALGRID_REMOTE_URL", value_name = "URL")]
    remote: Option<String>,
    /// API key for the document store
    #[arg(long, global = true, env = "CALGRID_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Skip the remote entirely for this run
    #[arg(long, global = true)]
    offline: bool,
    /// Where default messages live: seeded or overlay
    #[arg(long, global = true, value_name = "MODE")]
    message_mode: Option<MessageMode>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log the calories for a day, replacing any earlier value for that day
    Log {
        /// Total calories eaten that day
        calories: u32,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the entry for a day (defaults to today)
    Show {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the entry for a day (defaults to today)
    Delete {
        /// Date to delete (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a month as a coloured calendar grid
    Calendar {
        /// Month to show (YYYY-MM, default: this month)
        #[arg(short, long)]
        month: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change the daily calorie goal
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Manage motivational messages
    Message {
        #[command(subcommand)]
        command: MessageCommands,
    },
    /// Pull records from the remote and merge them in (remote wins)
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a document store other installs can sync through
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set the daily calorie goal
    Set {
        /// Calories per day (must be greater than 0)
        #[arg(allow_negative_numbers = true)]
        calories: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the daily calorie goal
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MessageCommands {
    /// List all messages
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a message
    Add {
        /// Message text
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the text of a message
    Edit {
        /// Position from `message list`, or the message id
        message: String,
        /// New text
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a message
    Delete {
        /// Position from `message list`, or the message id
        message: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a random message
    Random {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let command = match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            let db = Database::open(&config.remote_db_path)?;
            return server::start_server(db, port, &bind, api_key).await;
        }
        command => command,
    };

    let remote: Option<Arc<dyn RemoteDatabase>> = if cli.offline {
        None
    } else if let Some((url, api_key)) = config.remote_endpoint(cli.remote, cli.api_key) {
        Some(Arc::new(HttpDatabase::new(&url, api_key)?))
    } else {
        None
    };

    let db = shared(Database::open(&config.db_path)?);
    let mut svc = CalgridService::open(db, remote, &config.service_options(cli.message_mode))?;

    // Every run is a cold start: reconcile once before touching anything
    if svc.entry_store().has_remote() && !matches!(command, Commands::Sync { .. }) {
        let report = svc.sync().await;
        tracing::debug!(?report, "startup sync");
    }

    let result = dispatch(&mut svc, command).await;
    svc.flush().await;
    result
}

async fn dispatch(svc: &mut CalgridService, command: Commands) -> Result<()> {
    match command {
        Commands::Log {
            calories,
            date,
            json,
        } => cmd_log(svc, calories, date, json),
        Commands::Show { date, json } => cmd_show(svc, date, json),
        Commands::Delete { date, json } => cmd_delete(svc, date, json),
        Commands::History { days, json } => cmd_history(svc, days, json),
        Commands::Calendar { month, json } => cmd_calendar(svc, month, json),
        Commands::Goal { command } => match command {
            GoalCommands::Set { calories, json } => cmd_goal_set(svc, calories, json),
            GoalCommands::Show { json } => cmd_goal_show(svc, json),
        },
        Commands::Message { command } => match command {
            MessageCommands::List { json } => cmd_message_list(svc, json),
            MessageCommands::Add { text, json } => cmd_message_add(svc, &text, json),
            MessageCommands::Edit {
                message,
                text,
                json,
            } => cmd_message_edit(svc, &message, &text, json),
            MessageCommands::Delete { message, json } => cmd_message_delete(svc, &message, json),
            MessageCommands::Random { json } => cmd_message_random(svc, json),
        },
        Commands::Sync { json } => cmd_sync(svc, json).await,
        Commands::Serve { .. } => unreachable!("serve runs without a local service"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "calgrid",
            "log",
            "1800",
            "--date",
            "2024-05-01",
            "--offline",
            "--message-mode",
            "overlay",
        ])
        .unwrap();
        assert!(cli.offline);
        assert_eq!(cli.message_mode, Some(MessageMode::Overlay));
        assert!(matches!(
            cli.command,
            Commands::Log { calories: 1800, .. }
        ));
    }

    #[test]
    fn rejects_bad_message_mode() {
        assert!(Cli::try_parse_from(["calgrid", "--message-mode", "both", "sync"]).is_err());
    }

    #[test]
    fn goal_set_accepts_negative_for_validation() {
        let cli = Cli::try_parse_from(["calgrid", "goal", "set", "-5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Goal {
                command: GoalCommands::Set { calories: -5, .. }
            }
        ));
    }
}
