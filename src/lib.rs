//! # product-match
//!
//! A small HTTP backend that serves a static product catalog and finds
//! catalog items that look like an uploaded photo.
//!
//! Visual matching is not done in this crate. Each upload is written to a
//! temporary file and handed to an external matcher program, whose JSON
//! output is relayed to the client. The temporary file is always removed once
//! the matcher has finished, whatever the outcome.
//!
//! ## Example
//!
//! ```rust,no_run
//! use product_match::matcher::process::ProcessMatcher;
//! use product_match::web::server::{create_router, AppState, ServerConfig};
//! use product_match::ProductCatalog;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let catalog = ProductCatalog::load_from_file(Path::new("products.json")).unwrap();
//! let matcher = ProcessMatcher::new("python3", vec!["match.py".into()]);
//!
//! let state = AppState::new(catalog, Arc::new(matcher), ServerConfig::default()).unwrap();
//! let app = create_router(state);
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: Product catalog loading and product link checks
//! - [`matcher`]: The external matcher boundary and its child-process implementation
//! - [`cli`]: Command-line interface implementation
//! - [`web`]: HTTP server, match dispatch and `image_url` downloads
//! - [`utils`]: Upload validation helpers

pub mod catalog;
pub mod cli;
pub mod matcher;
pub mod utils;
pub mod web;

// Re-export commonly used types for convenience
pub use catalog::store::{CatalogError, ProductCatalog};
pub use matcher::process::ProcessMatcher;
pub use matcher::{MatchError, Matcher};
