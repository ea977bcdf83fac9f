//! Command line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "evq")]
#[command(about = "Query a running desktop file-search service")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "EVQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format; the level is taken from RUST_LOG
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the index
    #[command(display_order = 1)]
    Search(SearchArgs),

    /// Print the service version
    #[command(display_order = 2)]
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bring the service's search window to the foreground
    #[command(display_order = 3)]
    Show,

    /// Ask the service to rebuild its index
    #[command(display_order = 4)]
    RebuildDb,
}

#[derive(Debug, Default, Args)]
pub struct SearchArgs {
    /// Search terms, joined with spaces
    pub terms: Vec<String>,

    /// Index of the first result to return
    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    /// Maximum number of results (defaults to the configured limit)
    #[arg(long = "max")]
    pub max_results: Option<u32>,

    /// Treat the terms as a regular expression
    #[arg(long)]
    pub regex: bool,

    /// Match against full paths instead of names
    #[arg(long)]
    pub match_path: bool,

    #[arg(long)]
    pub match_case: bool,

    #[arg(long)]
    pub whole_word: bool,

    /// Distinguish accented characters
    #[arg(long)]
    pub match_accents: bool,

    /// Run a named search from the configuration file
    #[arg(long)]
    pub preset: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Include result totals
    #[arg(long)]
    pub stats: bool,
}

impl SearchArgs {
    pub fn joined_terms(&self) -> String {
        self.terms.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_flags_parse() {
        let cli = Cli::try_parse_from([
            "evq", "search", "--max", "5", "--regex", "--whole-word", "foo", "bar",
        ])
        .unwrap();
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.joined_terms(), "foo bar");
                assert_eq!(args.max_results, Some(5));
                assert!(args.regex && args.whole_word);
                assert!(!args.match_case);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["evq", "version", "--log-format", "json", "--config", "x.toml"])
            .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn rebuild_db_is_kebab_case() {
        let cli = Cli::try_parse_from(["evq", "rebuild-db"]).unwrap();
        assert!(matches!(cli.command, Command::RebuildDb));
    }
}
