use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::store::ProductCatalog;

/// Per-request timeout used by `catalog check-urls` unless overridden
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a HEAD request against one product link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UrlStatus {
    /// Answered 200
    Active,
    /// Answered with any other status
    Inactive { code: u16 },
    /// No answer at all (DNS, connect, TLS, timeout)
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlReport {
    pub url: String,
    #[serde(flatten)]
    pub status: UrlStatus,
}

impl UrlReport {
    /// One line of the plain-text report
    pub fn line(&self) -> String {
        match &self.status {
            UrlStatus::Active => format!("ACTIVE - {}", self.url),
            UrlStatus::Inactive { code } => format!("INACTIVE ({code}) - {}", self.url),
            UrlStatus::Error { message } => format!("ERROR - {} ({message})", self.url),
        }
    }
}

/// Build the client used for link checks
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn check_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Collect the string values of `field` across the catalog, in catalog order.
///
/// Products without the field, or with a non-string value, are skipped.
pub fn product_urls(catalog: &ProductCatalog, field: &str) -> Vec<String> {
    catalog
        .products()
        .iter()
        .filter_map(|product| match product.get(field) {
            Some(Value::String(url)) if !url.trim().is_empty() => Some(url.trim().to_string()),
            _ => None,
        })
        .collect()
}

/// Send a HEAD request to `url` and classify the answer
pub async fn check_url(client: &reqwest::Client, url: &str) -> UrlReport {
    let status = match client.head(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => UrlStatus::Active,
        Ok(response) => UrlStatus::Inactive {
            code: response.status().as_u16(),
        },
        Err(e) => UrlStatus::Error {
            message: e.to_string(),
        },
    };
    tracing::debug!("{url}: {status:?}");

    UrlReport {
        url: url.to_string(),
        status,
    }
}

/// Check each URL in turn
pub async fn check_urls(client: &reqwest::Client, urls: &[String]) -> Vec<UrlReport> {
    let mut reports = Vec::with_capacity(urls.len());
    for url in urls {
        reports.push(check_url(client, url).await);
    }
    reports
}
