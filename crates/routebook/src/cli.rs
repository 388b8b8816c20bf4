//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};

/// routebook - Climbers, routes and feeds
#[derive(Debug, Parser)]
#[command(name = "routebook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Documents fetched per page (overrides PAGE_SIZE).
    #[arg(long, global = true)]
    pub page_size: Option<usize>,

    /// Output format.
    #[arg(long, global = true, default_value = "pretty")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Raw JSON output.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load the demo climbers and routes.
    Seed,
    /// Show a user and their relationships.
    User {
        /// User ID.
        id: String,
    },
    /// List routes set by a user, newest first.
    Routes {
        /// Setter user ID.
        #[arg(long)]
        setter: String,
        /// Maximum number of routes to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List the newest routes.
    Recent {
        /// Maximum number of routes to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the newest routes set by everyone a user follows.
    Feed {
        /// User ID.
        user: String,
        /// Maximum number of routes to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Follow another user.
    Follow {
        /// Follower user ID.
        user: String,
        /// User ID to follow.
        target: String,
    },
    /// Stop following a user.
    Unfollow {
        /// Follower user ID.
        user: String,
        /// User ID to stop following.
        target: String,
    },
    /// Like a route.
    Like {
        /// User ID.
        user: String,
        /// Route ID.
        route: String,
    },
    /// Remove a like from a route.
    Unlike {
        /// User ID.
        user: String,
        /// Route ID.
        route: String,
    },
    /// Delete a route and every like on it.
    DeleteRoute {
        /// Route ID.
        route: String,
    },
}
