//! Operator CLI surface (§6): the store is the only operator interface in principle,
//! but these subcommands are ergonomic wrappers around the documented mutations
//! (clearing `Failed`, restarting a permanently-failed job) rather than a new
//! mechanism.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vodarchive", version, about = "VOD archiver job pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the Dispatcher and Ingestor loops (default when no subcommand is given).
    Run,
    /// List every job row and its current stage.
    Status,
    /// Clear `Failed` on a permanently-failed job so the Dispatcher will pick it up
    /// again on its next poll.
    Retry {
        vod_id: String,
        /// Also reset the consecutive-failure counter back to zero.
        #[arg(long)]
        reset_fail_count: bool,
    },
}
