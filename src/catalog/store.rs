use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog must be a JSON array of products (found {0})")]
    NotAnArray(&'static str),
}

/// The in-memory product catalog.
///
/// Records are opaque JSON values and are served exactly as loaded.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Value>,
}

impl ProductCatalog {
    /// Load catalog from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse catalog from JSON string
    ///
    /// Accepts a top-level array, or an object whose only purpose is to wrap
    /// the array under a `products` key.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let document: Value = serde_json::from_str(json)?;

        let products = match document {
            Value::Array(products) => products,
            Value::Object(mut map) => match map.remove("products") {
                Some(Value::Array(products)) => products,
                _ => return Err(CatalogError::NotAnArray("object")),
            },
            other => return Err(CatalogError::NotAnArray(kind_of(&other))),
        };

        Ok(Self { products })
    }

    /// All products, in catalog order
    pub fn products(&self) -> &[Value] {
        &self.products
    }

    /// Export catalog to JSON
    pub fn to_json(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(&self.products)?)
    }

    /// Number of products in catalog
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Check if catalog is empty
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id": 1, "name": "Red Chair", "image": "https://example.com/1.jpg", "category": "furniture"},
        {"id": 2, "name": "Blue Lamp", "image": "https://example.com/2.jpg"}
    ]"#;

    #[test]
    fn test_from_json_array() {
        let catalog = ProductCatalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.products()[0]["name"], "Red Chair");
        assert_eq!(catalog.products()[1]["id"], 2);
    }

    #[test]
    fn test_from_json_wrapped_products() {
        let wrapped = format!(r#"{{"products": {SAMPLE}}}"#);
        let catalog = ProductCatalog::from_json(&wrapped).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        assert!(matches!(
            ProductCatalog::from_json(r#"{"items": []}"#),
            Err(CatalogError::NotAnArray("object"))
        ));
        assert!(matches!(
            ProductCatalog::from_json("42"),
            Err(CatalogError::NotAnArray("number"))
        ));
        assert!(matches!(
            ProductCatalog::from_json("[1, 2"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = ProductCatalog::from_json("[]").unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_records_keep_key_order() {
        let json = r#"[{"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}}]"#;
        let catalog = ProductCatalog::from_json(json).unwrap();
        let out = serde_json::to_string(catalog.products()).unwrap();
        assert_eq!(out, r#"[{"zeta":1,"alpha":2,"mid":{"b":1,"a":2}}]"#);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = ProductCatalog::load_from_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ProductCatalog::load_from_file(Path::new("/nonexistent/products.json"));
        assert!(matches!(result, Err(CatalogError::Read(_))));
    }
}
