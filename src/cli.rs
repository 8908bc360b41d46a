//! Command-line interface definitions for Topic Digest.
//!
//! This module defines the CLI subcommands and options using the `clap` crate.
//! The store directory can also be provided via an environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Topic Digest application.
///
/// # Examples
///
/// ```sh
/// # One pipeline run against the built-in catalog
/// topic_digest run --store-dir ./store
///
/// # With a config file, also writing the run report to disk
/// topic_digest run -c config.yaml -s ./store --report ./last_run.json
///
/// # Read a shuffled page of the aggregate dataset
/// topic_digest page --category all --page 2 --limit 20 -s ./store
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one pipeline run and print the run report as JSON
    Run {
        /// Optional path to config.yaml file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory backing the dataset store
        #[arg(short, long, env = "TOPIC_DIGEST_STORE_DIR")]
        store_dir: PathBuf,

        /// Also write the run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print one shuffled page of a published dataset
    Page {
        /// Topic name, or `all` for the aggregate
        #[arg(long, default_value = "all")]
        category: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Articles per page (1-100)
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Directory backing the dataset store
        #[arg(short, long, env = "TOPIC_DIGEST_STORE_DIR")]
        store_dir: PathBuf,
    },
}
