//! CLI definitions for mcplink.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// mcplink CLI.
#[derive(Parser)]
#[command(name = "mcplink")]
#[command(about = "Connection manager and tool bridge for MCP servers")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ~/.mcplink/mcplink.toml)
    #[arg(short, long, env = "MCPLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List configured servers
    Servers {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Connect to a server, list its tools and report
    Test {
        /// Server ID
        server_id: String,
    },

    /// List the tools a server exposes
    Tools {
        /// Server ID
        server_id: String,
    },

    /// Invoke a tool on a server
    Call {
        /// Server ID
        server_id: String,

        /// Tool name
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Sync remote tools into the tool registry
    Sync {
        /// Owning user
        #[arg(short, long, default_value = crate::register::DEFAULT_USER)]
        user: String,

        /// Only sync this server (default: every enabled server of the user)
        server_id: Option<String>,
    },

    /// Remove a server's tools from the tool registry
    Remove {
        /// Server ID
        server_id: String,

        /// Owning user
        #[arg(short, long, default_value = crate::register::DEFAULT_USER)]
        user: String,
    },
}
