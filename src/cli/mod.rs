//! gexdesk CLI
//!
//! Commands:
//! - `gexdesk run` - Health check, position management, scan and screen
//! - `gexdesk gex` - Gamma exposure profile and regime signal
//! - `gexdesk screen` - Credit spread screening with gamma context
//! - `gexdesk scan` - Watchlist IV-rank scan
//! - `gexdesk risk` - Portfolio risk report
//! - `gexdesk manage` - Positions due for closing
//! - `gexdesk report` - Balances and positions
//! - `gexdesk watchlists` - Private and public watchlist names
//! - `gexdesk market` - Market session status

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Options analytics desk
#[derive(Parser, Debug)]
#[command(name = "gexdesk")]
#[command(author, version, about = "Gamma exposure, spread screening and portfolio risk")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Broker data snapshot (JSON) to run against
    #[arg(long, global = true, env = "GEXDESK_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration directory
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check portfolio health, manage positions, then scan and screen a watchlist
    Run {
        /// Watchlist to scan (private lists are searched first)
        #[arg(short, long)]
        watchlist: String,
        /// Account number (required when several accounts exist)
        #[arg(short, long)]
        account: Option<String>,
        /// Continue when buying power usage is over the limit
        #[arg(long)]
        force: bool,
        /// IV rank threshold in percent
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Include non-equity watchlist entries
        #[arg(long)]
        all_types: bool,
        /// Skip the gamma exposure overlay
        #[arg(long)]
        no_gex: bool,
    },

    /// Gamma exposure profile for an underlying
    Gex {
        /// Underlying symbol (e.g., SPY)
        symbol: String,
        /// Maximum days to expiration
        #[arg(long)]
        max_dte: Option<i64>,
        /// Strike band around spot as a fraction (0.20 = +/-20%)
        #[arg(long)]
        strike_range: Option<f64>,
        /// Seconds to collect streamed greeks
        #[arg(long)]
        wait: Option<f64>,
        /// Show every strike instead of major levels only
        #[arg(long)]
        all_strikes: bool,
    },

    /// Screen verticals and iron condors
    Screen {
        /// Underlying symbols
        #[arg(required = true)]
        symbols: Vec<String>,
        /// IV rank to use instead of looking it up
        #[arg(long)]
        ivr: Option<f64>,
        /// Skip the gamma exposure overlay
        #[arg(long)]
        no_gex: bool,
    },

    /// Scan symbols or a watchlist for high IV rank
    Scan {
        /// Watchlist name (private lists are searched first)
        #[arg(short, long)]
        watchlist: Option<String>,
        /// Symbols to scan when no watchlist is given
        symbols: Vec<String>,
        /// Include non-equity watchlist entries
        #[arg(long)]
        all_types: bool,
        /// IV rank threshold in percent
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Portfolio risk report
    Risk {
        /// Account number (required when several accounts exist)
        #[arg(short, long)]
        account: Option<String>,
        /// Exit successfully even above the buying power limit
        #[arg(long)]
        force: bool,
    },

    /// Positions hitting the profit target or time stop
    Manage {
        /// Account number (required when several accounts exist)
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Balances and open positions
    Report {
        /// Account number (required when several accounts exist)
        #[arg(short, long)]
        account: Option<String>,
    },

    /// List private and public watchlists
    Watchlists,

    /// Market session status
    Market,
}
