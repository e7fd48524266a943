//! Command-line interface for product-match.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **serve**: Start the HTTP API
//! - **match**: Run the matcher once against a local image
//! - **catalog**: Inspect a product catalog file
//!
//! ## Usage
//!
//! ```text
//! # Serve products.json on port 5000, matching with `python3 match.py <image>`
//! product-match serve
//!
//! # Custom matcher and port (also settable via MATCHER_PROGRAM / PORT)
//! product-match serve --port 8080 --matcher ./clip-matcher
//!
//! # Check a matcher without going through HTTP
//! product-match match sofa.jpg --matcher ./clip-matcher
//!
//! # Validate a catalog before deploying it
//! product-match catalog validate --catalog products.json
//! ```

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::matcher::process::ProcessMatcher;

pub mod catalog;
pub mod match_image;

#[derive(Parser)]
#[command(name = "product-match")]
#[command(version)]
#[command(about = "Serve a product catalog and relay visual matches from an external matcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve(ServeArgs),

    /// Run the matcher against a local image and print its result
    Match(match_image::MatchArgs),

    /// Inspect a product catalog
    Catalog(catalog::CatalogArgs),
}

#[derive(clap::Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Address to bind to
    #[arg(short, long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// Product catalog served from /api/products
    #[arg(long, env = "CATALOG_PATH", default_value = "products.json")]
    pub catalog: PathBuf,

    #[command(flatten)]
    pub matcher: MatcherArgs,

    /// Directory for temporary upload files (defaults to the system temp dir)
    #[arg(long, env = "UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Largest accepted image upload, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = crate::web::server::DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Maximum number of requests handled at once
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value = "100")]
    pub max_concurrent: usize,

    /// Seconds allowed for downloading an image_url
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = crate::web::server::DEFAULT_FETCH_TIMEOUT.as_secs())]
    pub fetch_timeout: u64,
}

/// Program run when no matcher is configured
pub const DEFAULT_MATCHER_PROGRAM: &str = "python3";

/// Script handed to [`DEFAULT_MATCHER_PROGRAM`] when no arguments are configured
pub const DEFAULT_MATCHER_SCRIPT: &str = "match.py";

/// How to invoke the external matcher: `<matcher> <matcher-arg>... <image>`
#[derive(clap::Args, Clone, Debug)]
pub struct MatcherArgs {
    /// Matcher program [default: python3 match.py]
    #[arg(long = "matcher", env = "MATCHER_PROGRAM")]
    pub program: Option<OsString>,

    /// Argument placed before the image path (repeatable)
    #[arg(long = "matcher-arg", env = "MATCHER_ARG", allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

impl MatcherArgs {
    /// Resolve the configured command.
    ///
    /// A configured program runs with exactly the configured arguments. With
    /// no program, `python3` runs the given arguments, or `match.py` if none.
    pub fn build(&self) -> ProcessMatcher {
        match &self.program {
            Some(program) => ProcessMatcher::new(program.clone(), self.args.clone()),
            None if self.args.is_empty() => ProcessMatcher::new(
                DEFAULT_MATCHER_PROGRAM,
                vec![OsString::from(DEFAULT_MATCHER_SCRIPT)],
            ),
            None => ProcessMatcher::new(DEFAULT_MATCHER_PROGRAM, self.args.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
