//! Configuration for the indexer.
//!
//! The CLI surface is parsed into an immutable [`RunConfig`] that is
//! threaded through the orchestrator and its components explicitly.

mod cli;
mod dependencies;

use std::path::{Path, PathBuf};

use osm_indexer_pipeline::converter::DecodePolicy;

pub use cli::Cli;
pub use dependencies::Dependencies;

/// Fallback task name when the input file has no usable stem.
const DEFAULT_TASK: &str = "extract";

/// Immutable configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// OSM input PBF file.
    pub input_file: PathBuf,
    /// Index name prefix.
    pub index_prefix: String,
    /// Task (area) identifier, derived from the input file name.
    pub task: String,
    /// Search engine URL.
    pub es_url: String,
    /// Search engine user.
    pub es_user: String,
    /// Search engine password.
    pub es_pwd: String,
    /// Replica count restored after loading.
    pub target_replicas: u32,
    /// Maximum number of layer pipelines running concurrently.
    pub workers: usize,
    /// Documents accumulated per bulk write.
    pub cache_size: usize,
    /// Decode-failure policy for the converter.
    pub decode_policy: DecodePolicy,
    /// Verbose logging.
    pub verbose: bool,
}

impl From<Cli> for RunConfig {
    fn from(cli: Cli) -> Self {
        let task = task_from_input(&cli.input_file);
        let decode_policy = if cli.fail_on_decode_error {
            DecodePolicy::Fail
        } else {
            DecodePolicy::Skip
        };

        Self {
            task,
            index_prefix: cli.index_name,
            input_file: cli.input_file,
            es_url: cli.es_url,
            es_user: cli.es_user,
            es_pwd: cli.es_pwd,
            target_replicas: cli.es_replicas,
            workers: cli.workers,
            cache_size: cli.cache_size,
            decode_policy,
            verbose: cli.verbose,
        }
    }
}

/// Derive the task identifier from the input file name.
///
/// Index names must be lowercase, so the stem is lowercased and characters
/// the engine rejects are folded to underscores.
fn task_from_input(input_file: &Path) -> String {
    let stem = match input_file.file_stem() {
        Some(stem) => stem.to_string_lossy(),
        None => return DEFAULT_TASK.to_string(),
    };

    let task: String = stem
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if task.is_empty() {
        DEFAULT_TASK.to_string()
    } else {
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_task_from_input() {
        assert_eq!(
            task_from_input(Path::new("/data/andorra-latest.osm.pbf")),
            "andorra-latest_osm"
        );
        assert_eq!(task_from_input(Path::new("Planet.pbf")), "planet");
        assert_eq!(task_from_input(Path::new("..")), "extract");
    }

    #[test]
    fn test_run_config_from_cli() {
        let cli = Cli::parse_from(["osm-indexer", "/data/andorra.pbf", "--workers", "4"]);
        let config = RunConfig::from(cli);

        assert_eq!(config.task, "andorra");
        assert_eq!(config.index_prefix, "openstreetmap");
        assert_eq!(config.workers, 4);
        assert_eq!(config.cache_size, 5000);
        assert_eq!(config.decode_policy, DecodePolicy::Skip);
    }

    #[test]
    fn test_fail_fast_flag() {
        let cli = Cli::parse_from(["osm-indexer", "a.pbf", "--fail-on-decode-error"]);
        let config = RunConfig::from(cli);
        assert_eq!(config.decode_policy, DecodePolicy::Fail);
    }
}
