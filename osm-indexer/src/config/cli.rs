//! Command line surface for the indexer.

use std::path::PathBuf;

use clap::Parser;

/// Imports OSM data into a search engine, layer by layer.
#[derive(Debug, Parser)]
#[command(name = "osm-indexer", version, about)]
pub struct Cli {
    /// OSM input PBF file
    pub input_file: PathBuf,

    /// Index name prefix
    #[arg(long = "index-name", default_value = "openstreetmap")]
    pub index_name: String,

    /// Search engine url
    #[arg(long = "es-url", env = "ES_URL", default_value = "http://localhost:9200")]
    pub es_url: String,

    /// Search engine user
    #[arg(long = "es-user", env = "ES_USER", default_value = "elastic")]
    pub es_user: String,

    /// Search engine password
    #[arg(long = "es-pwd", env = "ES_PWD", default_value = "changeme")]
    pub es_pwd: String,

    /// Index replicas restored after loading
    #[arg(long = "es-replicas", env = "ES_REPLICAS", default_value_t = 0)]
    pub es_replicas: u32,

    /// Number of layer pipelines to run concurrently
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Number of documents to accumulate before sending to the engine
    #[arg(long = "cache-size", default_value_t = 5000)]
    pub cache_size: usize,

    /// Fail a layer on the first malformed feature instead of skipping it
    #[arg(long = "fail-on-decode-error")]
    pub fail_on_decode_error: bool,

    /// Enable verbose output
    #[arg(short = 'v')]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["osm-indexer", "andorra.osm.pbf"]);

        assert_eq!(cli.input_file, PathBuf::from("andorra.osm.pbf"));
        assert_eq!(cli.index_name, "openstreetmap");
        assert_eq!(cli.es_replicas, 0);
        assert_eq!(cli.workers, 1);
        assert_eq!(cli.cache_size, 5000);
        assert!(!cli.fail_on_decode_error);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_missing_input_file_rejected() {
        assert!(Cli::try_parse_from(["osm-indexer"]).is_err());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "osm-indexer",
            "planet.pbf",
            "--index-name",
            "osm",
            "--es-replicas",
            "2",
            "--cache-size",
            "100",
            "-v",
        ]);

        assert_eq!(cli.index_name, "osm");
        assert_eq!(cli.es_replicas, 2);
        assert_eq!(cli.cache_size, 100);
        assert!(cli.verbose);
    }
}
