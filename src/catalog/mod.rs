//! Product catalog storage.
//!
//! The catalog is a single JSON document listing product records. It is read
//! once at startup and served unchanged for the life of the process; the shape
//! of each record is not interpreted, except by the link checker in
//! [`url_check`], which reads one string field per product.
//!
//! ## Example
//!
//! ```rust,no_run
//! use product_match::ProductCatalog;
//! use std::path::Path;
//!
//! let catalog = ProductCatalog::load_from_file(Path::new("products.json")).unwrap();
//! for product in catalog.products() {
//!     println!("{}", product["name"]);
//! }
//! ```

pub mod store;
pub mod url_check;
