//! chatsync - two-party chat from the terminal.

mod app;
mod backend;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use chat_config_and_utils::{init_logging, parse_level, Config, Paths};

use crate::backend::Backend;

/// chatsync command-line interface.
#[derive(Parser)]
#[command(name = "chatsync")]
#[command(about = "Two-party chat threads with a live tail and paged history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, database, and logs. Defaults to ~/.chatsync
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Where messages and users are stored
    #[arg(long, value_enum, default_value_t = BackendKind::Local, global = true)]
    backend: BackendKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// SQLite database under the base directory
    Local,
    /// Hosted Supabase project (needs a publishable key)
    Hosted,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered users
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// List the users you can chat with
    Contacts {
        /// Your user id
        #[arg(long = "as")]
        me: String,
    },
    /// Send a message
    Send {
        /// Your user id
        #[arg(long = "as")]
        me: String,
        /// Recipient user id
        #[arg(long)]
        to: String,
        /// Message text
        text: String,
    },
    /// Print a conversation
    History {
        /// Your user id
        #[arg(long = "as")]
        me: String,
        /// The other participant
        #[arg(long)]
        with: String,
        /// Older pages to load before printing
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Follow a conversation until Ctrl-C
    Watch {
        /// Your user id
        #[arg(long = "as")]
        me: String,
        /// The other participant
        #[arg(long)]
        with: String,
    },
    /// Print the conversation id for two participants
    ConversationId {
        a: String,
        b: String,
        /// Use the `a_b` scheme of older clients
        #[arg(long)]
        legacy: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register or update a user
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Existing id to update; a new one is generated otherwise
        #[arg(long)]
        id: Option<String>,
    },
    /// List all users
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&parse_level(&level).to_string().to_lowercase(), Some(&paths));

    let mut out = std::io::stdout();

    let command = match cli.command {
        Commands::ConversationId { a, b, legacy } => {
            return app::print_conversation_id(a, b, legacy, &mut out);
        }
        command => command,
    };

    let backend = Backend::open(&config, &paths, cli.backend)?;
    match command {
        Commands::Users { command } => match command {
            UserCommands::Add { name, email, id } => {
                app::add_user(&backend, id, name, email, &mut out).await?;
            }
            UserCommands::List => app::list_users(&backend, &mut out).await?,
        },
        Commands::Contacts { me } => app::contacts(&backend, me, &mut out).await?,
        Commands::Send { me, to, text } => {
            app::send(&backend, &config, me, to, text, &mut out).await?
        }
        Commands::History { me, with, pages } => {
            app::history(&backend, &config, me, with, pages, &mut out).await?
        }
        Commands::Watch { me, with } => {
            let shutdown = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "failed to listen for Ctrl-C");
                }
            };
            app::watch(&backend, &config, me, with, shutdown, &mut out).await?
        }
        // needs no store; answered above
        Commands::ConversationId { .. } => {}
    }

    Ok(())
}
