pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gleaner")]
#[command(about = "Incremental harvester for infinite-scroll group feeds", long_about = None)]
pub struct Cli {
    /// SQLite database path (default: data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.config/gleaner/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect posts from a group feed
    Collect {
        /// URL of the group feed
        url: String,

        /// Number of posts to collect
        #[arg(short, long, default_value_t = 100)]
        target: usize,

        /// Directory for the exported JSON
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// Re-export the last stored result
    Export {
        /// Export the last partial result instead
        #[arg(long)]
        partial: bool,

        /// Directory for the exported JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show the last run state and recent runs
    Status {
        /// Number of recent runs to list
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collect() {
        let cli = Cli::parse_from([
            "gleaner",
            "collect",
            "https://www.facebook.com/groups/42",
            "--target",
            "25",
            "--headed",
        ]);
        match cli.command {
            Commands::Collect {
                url,
                target,
                out,
                headed,
            } => {
                assert_eq!(url, "https://www.facebook.com/groups/42");
                assert_eq!(target, 25);
                assert!(out.is_none());
                assert!(headed);
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn test_global_db_flag() {
        let cli = Cli::parse_from(["gleaner", "export", "--partial", "--db", "/tmp/g.db"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/g.db")));
        assert!(matches!(cli.command, Commands::Export { partial: true, .. }));
    }
}
