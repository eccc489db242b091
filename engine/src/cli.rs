//! CLI interface for Trellis
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Trellis project-tracking assistant
///
/// Converses about a project, routes each message through a workflow of
/// specialized agents, and records durable decisions with citations.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a message to a project's assistant
    Chat {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// The message to send
        message: String,
    },

    /// Show a project's items by state
    Items {
        /// Project identifier
        #[arg(short, long)]
        project: String,
    },

    /// Show recent conversation history
    History {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// Number of messages to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the recent activity trail
    Activity {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// Number of entries to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}
