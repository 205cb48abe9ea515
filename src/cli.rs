use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{GameConfig, StoreBackend};

#[derive(Parser)]
#[command(name = "guessing-game")]
#[command(version)]
#[command(about = "Guess numbers during builds and keep score across build history")]
pub struct Args {
    /// Configuration file (defaults to ./guessing.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the durable store backend
    #[arg(long, value_enum, global = true)]
    pub store: Option<StoreBackend>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run one build: guess steps, status decision, then persist the records
    Run {
        /// Project the build belongs to
        #[arg(long, default_value = "default")]
        project: String,

        /// Lower bound (inclusive)
        #[arg(long)]
        lower: Option<i64>,

        /// Upper bound (inclusive)
        #[arg(long)]
        upper: Option<i64>,

        /// Number of guess steps in the build
        #[arg(long, default_value = "1")]
        steps: u32,

        /// Use this guess instead of a random one (build parameter `guess`)
        #[arg(long)]
        guess: Option<String>,
    },

    /// Show local and global guessing statistics
    Stats {
        #[arg(long, default_value = "default")]
        project: String,
    },

    /// Validate bounds the way the step configuration form does
    Check {
        #[arg(long)]
        lower: Option<i64>,

        #[arg(long)]
        upper: Option<i64>,
    },
}

impl Args {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_to(&self, config: &mut GameConfig) {
        if let Some(backend) = self.store {
            config.store.backend = backend;
        }
        match &self.command {
            Command::Run { lower, upper, .. } | Command::Check { lower, upper } => {
                if lower.is_some() {
                    config.bounds.lower = *lower;
                }
                if upper.is_some() {
                    config.bounds.upper = *upper;
                }
            }
            Command::Stats { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_run_defaults() {
        let args = Args::parse_from(["gg", "run"]);
        assert_eq!(
            args.command,
            Command::Run {
                project: "default".to_string(),
                lower: None,
                upper: None,
                steps: 1,
                guess: None,
            }
        );
        assert!(args.config.is_none());
        assert!(args.store.is_none());
    }

    #[test]
    fn test_args_parse_run_full() {
        let args = Args::parse_from([
            "gg", "run", "--project", "web", "--lower", "1", "--upper", "6", "--steps", "3",
            "--guess", "4",
        ]);
        assert_eq!(
            args.command,
            Command::Run {
                project: "web".to_string(),
                lower: Some(1),
                upper: Some(6),
                steps: 3,
                guess: Some("4".to_string()),
            }
        );
    }

    #[test]
    fn test_args_global_store_after_subcommand() {
        let args = Args::parse_from(["gg", "stats", "--store", "sqlite"]);
        assert_eq!(args.store, Some(StoreBackend::Sqlite));
    }

    #[test]
    fn test_args_config_path() {
        let args = Args::parse_from(["gg", "--config", "ci/guessing.toml", "check"]);
        assert_eq!(args.config, Some(PathBuf::from("ci/guessing.toml")));
    }

    #[test]
    fn test_args_negative_lower() {
        let args = Args::parse_from(["gg", "check", "--lower=-3", "--upper", "2"]);
        assert_eq!(
            args.command,
            Command::Check {
                lower: Some(-3),
                upper: Some(2)
            }
        );
    }

    #[test]
    fn test_apply_overrides_bounds_and_store() {
        let args = Args::parse_from(["gg", "--store", "memory", "run", "--upper", "5"]);
        let mut config = GameConfig::default();
        config.bounds.lower = Some(2);
        args.apply_to(&mut config);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.bounds.lower, Some(2));
        assert_eq!(config.bounds.upper, Some(5));
    }

    #[test]
    fn test_stats_leaves_bounds_alone() {
        let args = Args::parse_from(["gg", "stats"]);
        let mut config = GameConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.bounds.upper, None);
    }
}
