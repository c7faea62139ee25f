//! Command-line flags for `replisyncd`
//!
//! Every flag is optional at the parser level so a configuration file can
//! supply the value instead; [`Cli::apply`] layers the flags that were given
//! over a [`ConfigBuilder`] seeded from the loaded config.

use std::path::PathBuf;

use clap::Parser;
use replisync_core::{config::ConfigBuilder, domain::pass::CompareMode};

#[derive(Debug, Parser)]
#[command(
    name = "replisyncd",
    version,
    about = "Keep a replica directory an exact one-way copy of a source directory"
)]
pub struct Cli {
    /// Root of the authoritative tree (never modified)
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Root of the mirror tree (created if missing)
    #[arg(long, value_name = "PATH")]
    pub replica: Option<PathBuf>,

    /// Minutes between passes [default: 30]
    #[arg(long, value_name = "MINUTES")]
    pub interval: Option<u64>,

    /// File that log records are appended to [default: sync_log.txt]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// When to copy a file: always, size-and-mtime, checksum [default: always]
    #[arg(long, value_name = "MODE")]
    pub compare: Option<CompareMode>,

    /// Leave replica directories that no longer exist in source in place
    #[arg(long)]
    pub keep_orphan_dirs: bool,

    /// Back off exponentially after failed passes, up to this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub backoff_max: Option<u64>,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Overrides the builder's values with every flag that was given
    pub fn apply(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(source) = &self.source {
            builder = builder.sync_source(source.clone());
        }
        if let Some(replica) = &self.replica {
            builder = builder.sync_replica(replica.clone());
        }
        if let Some(minutes) = self.interval {
            builder = builder.sync_interval_minutes(minutes);
        }
        if let Some(mode) = self.compare {
            builder = builder.sync_compare(mode);
        }
        if self.keep_orphan_dirs {
            builder = builder.sync_prune_directories(false);
        }
        if let Some(minutes) = self.backoff_max {
            builder = builder.sync_backoff_max_minutes(minutes);
        }
        if let Some(file) = &self.log_file {
            builder = builder.logging_file(file.clone());
        }

        builder
    }

    /// Effective log level: `-v` and `-vv` win over the configured one
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        match self.verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    }
}
