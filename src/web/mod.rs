//! HTTP API for the product catalog and image matching.
//!
//! This module provides the web server using Axum. The catalog is loaded once
//! before the listener binds and is never modified afterwards.
//!
//! ## Starting the Server
//!
//! ```text
//! # Start on default port 5000
//! product-match serve
//!
//! # Custom port and matcher
//! PORT=3000 product-match serve --matcher ./clip-matcher
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /` - Health check
//! - `GET /api/products` - The full product catalog as a JSON array
//! - `POST /api/match` - Match an image, sent either as a multipart form
//!   (`image` field) or as a JSON body `{"image_url": "https://..."}`
//!
//! Failed matches answer with `{"error": ..., "details": ...}`.

pub mod fetch;
pub mod server;
