use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "revu", about = "Revu session manager", version)]
pub struct Cli {
    /// Base URL of the auth API (overrides REVU_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory holding the session file. Defaults to the platform data dir.
    #[arg(long, global = true, env = "REVU_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the version
    Version,

    /// Sign in and persist the session
    Login {
        #[arg(long, short)]
        username: Option<String>,

        #[arg(long, short, env = "REVU_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Register this device with the multi-device session registry
        #[arg(long)]
        register: bool,
    },

    /// Clear the local session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Show session validity and remaining lifetime
    Status,

    /// Renew the token if it is inside the refresh window
    Refresh,

    /// Keep the session fresh until interrupted
    Watch {
        /// Seconds between refresh checks
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },

    /// Manage sessions on other devices
    #[command(subcommand)]
    Sessions(SessionCommands),
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List active sessions
    List,

    /// Revoke one session
    Revoke { id: String },

    /// Revoke every session except this device's
    RevokeOthers,
}
