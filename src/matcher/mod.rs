//! The boundary to the external visual matcher.
//!
//! Matching itself happens outside this crate. A [`Matcher`] takes the path of
//! an image on disk and yields either the JSON document describing the matches
//! or a [`MatchError`]. [`process::ProcessMatcher`] is the production
//! implementation and runs a child process per call; tests substitute their own.
//!
//! ## Example
//!
//! ```rust,no_run
//! use product_match::matcher::{process::ProcessMatcher, Matcher};
//! use std::path::Path;
//!
//! # async fn demo() {
//! let matcher = ProcessMatcher::new("python3", vec!["match.py".into()]);
//! match matcher.match_image(Path::new("/tmp/photo.jpg")).await {
//!     Ok(result) => println!("{result}"),
//!     Err(e) => eprintln!("{e}: {}", e.details()),
//! }
//! # }
//! ```

pub mod process;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Something that can find catalog matches for an image file.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Match the image stored at `path`.
    ///
    /// The file must exist for the whole duration of the call.
    async fn match_image(&self, path: &Path) -> Result<Value, MatchError>;
}

/// Ways a match can fail.
///
/// Every variant maps to the same `{error, details}` response shape; the
/// `Display` text is the `error` and [`MatchError::details`] is the `details`.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Failed to start matcher")]
    Spawn(#[source] std::io::Error),

    #[error("Matcher exited with code {code}")]
    Exited { code: i32, stderr: String },

    #[error("Matcher was terminated by a signal")]
    Terminated { stderr: String },

    #[error("Invalid JSON output from matcher")]
    InvalidOutput { output: String },
}

impl MatchError {
    /// Diagnostic text passed through to the caller
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::Spawn(e) => e.to_string(),
            Self::Exited { stderr, .. } | Self::Terminated { stderr } => stderr.clone(),
            Self::InvalidOutput { output } => output.clone(),
        }
    }
}
