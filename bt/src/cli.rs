//! Command-line surface of `bt`

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::daemon::DaemonManager;
use crate::domain::{BreakCategory, ConversationId, PersonId, Requester};

/// BreakTime - break session tracker
#[derive(Debug, Parser)]
#[command(
    name = "bt",
    about = "Track breaks: who is out, for what, and for how long",
    version = crate::VERSION,
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Who a command is issued for
#[derive(Debug, Clone, Args)]
pub struct Identity {
    /// Person id
    #[arg(long = "person", allow_negative_numbers = true)]
    pub person_id: PersonId,

    /// Display name used in replies
    #[arg(long)]
    pub name: Option<String>,

    /// Conversation that replies and reminders go to
    #[arg(long, allow_negative_numbers = true)]
    pub conversation: Option<ConversationId>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("Person {}", self.person_id))
    }

    pub fn requester(&self) -> Requester {
        let who = Requester::new(self.person_id, self.display_name());
        match self.conversation {
            Some(id) => who.in_conversation(id),
            None => who,
        }
    }
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the breaktime daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Daemon entry point spawned by `bt daemon start`
    #[command(hide = true)]
    RunDaemon,

    /// Start a break (meal, restroom, smoke, other)
    Out {
        category: BreakCategory,

        /// Reason, required for `other`
        #[arg(short, long)]
        reason: Option<String>,

        #[command(flatten)]
        who: Identity,
    },

    /// End a break
    Back {
        category: BreakCategory,

        #[command(flatten)]
        who: Identity,
    },

    /// Press a chat button code such as E1 or S2
    Press {
        code: String,

        /// Reason, required for O1
        #[arg(short, long)]
        reason: Option<String>,

        #[command(flatten)]
        who: Identity,
    },

    /// Give the reason for a pending `other` break
    Reason {
        text: String,

        #[command(flatten)]
        who: Identity,
    },

    /// Cancel a pending `other` break
    Cancel {
        #[command(flatten)]
        who: Identity,
    },

    /// Show a day's break summary (today by default)
    Summary {
        /// Day as YYYY-MM-DD
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[command(flatten)]
        who: Identity,
    },

    /// List everyone currently on a break
    Active {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Close orphaned breaks now
    Reconcile,

    /// Ask the daemon to reconcile and clear every live session
    Reset,

    /// Drain queued reminders and reports
    Notifications {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Lifecycle of the background daemon
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start {
        /// Stay attached to the terminal
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the daemon
    Stop,

    /// Check daemon status
    Status {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Generate the after_help text with daemon status
pub fn generate_after_help() -> String {
    let daemon = DaemonManager::new();
    let status = if daemon.is_running() { "running" } else { "stopped" };
    format!("Daemon: {}\nPID file: {}\n", status, daemon.pid_file().display())
}

/// Output format for listing commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
