//! Download of images referenced by `image_url`.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while downloading an image
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
    #[error("Only http and https URLs are supported (got {0})")]
    UnsupportedScheme(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Image server answered {0}")]
    Status(u16),
    #[error("Content too large: more than {limit} bytes")]
    ContentTooLarge { limit: usize },
}

/// An image pulled from a remote server
#[derive(Debug)]
pub struct FetchedImage {
    /// Last path segment of the URL, if any
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Build the client used for `image_url` downloads
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn fetch_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}

/// Download `raw_url`, refusing bodies larger than `max_size` bytes
///
/// # Errors
///
/// Returns an error for a malformed or non-http URL, a transport failure, a
/// non-success status, or an oversized body.
pub async fn fetch_image(
    client: &reqwest::Client,
    raw_url: &str,
    max_size: usize,
) -> Result<FetchedImage, FetchError> {
    let url = reqwest::Url::parse(raw_url.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::UnsupportedScheme(url.scheme().to_string()));
    }

    let filename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string);

    let mut response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    if let Some(len) = response.content_length() {
        if usize::try_from(len).map_or(true, |len| len > max_size) {
            return Err(FetchError::ContentTooLarge { limit: max_size });
        }
    }

    // Content-Length may be absent or wrong, so the limit is enforced per chunk too
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() + chunk.len() > max_size {
            return Err(FetchError::ContentTooLarge { limit: max_size });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(FetchedImage { filename, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    async fn spawn_image_host() -> String {
        let app = Router::new()
            .route("/img/sofa.jpg", get(|| async { &b"\xFF\xD8\xFFsofa"[..] }))
            .route("/img/", get(|| async { &b"GIF89a"[..] }))
            .route("/img/big.png", get(|| async { vec![0u8; 4096] }))
            .route("/img/gone.jpg", get(|| async { StatusCode::NOT_FOUND }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        fetch_client(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let host = spawn_image_host().await;
        let image = fetch_image(&client(), &format!("{host}/img/sofa.jpg"), 1024)
            .await
            .unwrap();
        assert_eq!(image.filename.as_deref(), Some("sofa.jpg"));
        assert_eq!(image.bytes, b"\xFF\xD8\xFFsofa");
    }

    #[tokio::test]
    async fn test_fetch_image_without_filename() {
        let host = spawn_image_host().await;
        let image = fetch_image(&client(), &format!("{host}/img/"), 1024)
            .await
            .unwrap();
        assert!(image.filename.is_none());
        assert_eq!(image.bytes, b"GIF89a");
    }

    #[tokio::test]
    async fn test_fetch_image_errors() {
        let host = spawn_image_host().await;

        let result = fetch_image(&client(), &format!("{host}/img/gone.jpg"), 1024).await;
        assert!(matches!(result, Err(FetchError::Status(404))));

        let result = fetch_image(&client(), &format!("{host}/img/big.png"), 1024).await;
        assert!(matches!(
            result,
            Err(FetchError::ContentTooLarge { limit: 1024 })
        ));

        let result = fetch_image(&client(), "not a url", 1024).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));

        let result = fetch_image(&client(), "file:///etc/passwd", 1024).await;
        assert!(matches!(result, Err(FetchError::UnsupportedScheme(s)) if s == "file"));
    }
}
