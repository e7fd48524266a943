use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, FromRequest, Multipart, Request, State,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::store::ProductCatalog;
use crate::cli::ServeArgs;
use crate::matcher::{MatchError, Matcher};
use crate::web::fetch::{fetch_client, fetch_image, FetchError};
use crate::utils::validation::{upload_suffix, validate_upload_content, ValidationError};

/// Security configuration constants to prevent `DoS` attacks
pub const MAX_MULTIPART_FIELDS: usize = 10;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024; // 16MB
/// Room for multipart boundaries and headers on top of the file itself
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Name of the form field the upload is expected in
pub const IMAGE_FIELD: &str = "image";

/// Default time allowed for downloading an `image_url`
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const NO_IMAGE: &str = "No image file or image_url provided";

/// Server tunables that do not change while running
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where uploads are staged; `None` means the system temp dir
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub max_concurrent: usize,
    /// Whole-request timeout for `image_url` downloads
    pub fetch_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent: 100,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub catalog: ProductCatalog,
    pub matcher: Arc<dyn Matcher>,
    pub config: ServerConfig,
    /// Client for `image_url` downloads
    pub http: reqwest::Client,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        catalog: ProductCatalog,
        matcher: Arc<dyn Matcher>,
        config: ServerConfig,
    ) -> reqwest::Result<Self> {
        let http = fetch_client(config.fetch_timeout)?;
        Ok(Self {
            catalog,
            matcher,
            config,
            http,
        })
    }
}

/// Body of `/api/match` when the image is referenced by URL
#[derive(Debug, Deserialize)]
struct ImageUrlRequest {
    image_url: Option<String>,
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

/// An error that ends a request
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                details: details.into(),
            },
        }
    }

    fn internal(error: &str, details: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<MatchError> for ApiError {
    fn from(e: MatchError) -> Self {
        Self::internal(&e.to_string(), e.details())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::new(e.status(), "Failed to read upload", e.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        Self::new(e.status(), "Expected a multipart form upload", e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::new(e.status(), "Invalid JSON body", e.body_text())
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        let (status, error) = match e {
            FetchError::InvalidUrl(_) | FetchError::UnsupportedScheme(_) => {
                (StatusCode::BAD_REQUEST, "Invalid image_url")
            }
            FetchError::ContentTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "Invalid upload"),
            FetchError::Http(_) | FetchError::Status(_) => {
                (StatusCode::BAD_GATEWAY, "Failed to fetch image_url")
            }
        };
        Self::new(status, error, e.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        let status = match e {
            ValidationError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, "Invalid upload", e.to_string())
    }
}

/// An image received from the client or downloaded for it, still in memory
#[derive(Debug)]
struct Upload {
    filename: Option<String>,
    bytes: Bytes,
}

/// Run the web server
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded, the tokio runtime cannot
/// be created, or the server fails to start.
pub fn run(args: ServeArgs) -> anyhow::Result<()> {
    // Load before starting the runtime so a bad catalog never reaches a serving state
    let catalog = ProductCatalog::load_from_file(&args.catalog).map_err(|e| {
        anyhow::anyhow!("Failed to load catalog {}: {e}", args.catalog.display())
    })?;
    tracing::info!(
        "Loaded {} products from {}",
        catalog.len(),
        args.catalog.display()
    );

    let matcher = args.matcher.build();
    tracing::info!("Matcher command: {} <image>", matcher.command_line());

    let state = AppState::new(
        catalog,
        Arc::new(matcher),
        ServerConfig {
            upload_dir: args.upload_dir.clone(),
            max_upload_bytes: args.max_upload_bytes,
            max_concurrent: args.max_concurrent,
            fetch_timeout: Duration::from_secs(args.fetch_timeout),
        },
    )?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move { run_server(&args, state).await })
}

/// Create the application router with all routes and middleware configured.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let max_concurrent = state.config.max_concurrent.max(1);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(health_handler))
        .route("/api/products", get(products_handler))
        .route("/api/match", post(match_handler))
        .with_state(Arc::new(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-frame-options"),
                    HeaderValue::from_static("DENY"),
                ))
                .layer(cors)
                // Limit concurrent requests to prevent DOS
                .layer(ConcurrencyLimitLayer::new(max_concurrent))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

async fn run_server(args: &ServeArgs, state: AppState) -> anyhow::Result<()> {
    if let Some(dir) = &state.config.upload_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let app = create_router(state);

    let addr = format!("{}:{}", args.address, args.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Starting product-match server at http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Return the full catalog, exactly as loaded
async fn products_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.catalog.products()).into_response()
}

/// Stage the image, hand it to the matcher, and relay the matcher's answer
async fn match_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let start_time = Instant::now();

    let upload = receive_upload(&state, request).await?;
    let staged = stage_upload(&upload, state.config.upload_dir.as_deref()).await?;
    tracing::debug!(
        "Staged {} byte upload at {}",
        upload.bytes.len(),
        staged.display()
    );
    drop(upload);

    // The task owns the staged file, so matching and cleanup finish even if
    // the client goes away and this handler is dropped.
    let matcher = Arc::clone(&state.matcher);
    let outcome = tokio::spawn(async move {
        let result = matcher.match_image(&staged).await;
        release_upload(staged);
        result
    })
    .await
    .map_err(|e| ApiError::internal("Matcher task failed", e.to_string()))?;

    #[allow(clippy::cast_possible_truncation)] // Processing time won't exceed u64
    let elapsed_ms = start_time.elapsed().as_millis() as u64;

    match outcome {
        Ok(value) => {
            tracing::info!("Match completed in {elapsed_ms} ms");
            Ok(Json(value))
        }
        Err(e) => {
            tracing::warn!("Match failed after {elapsed_ms} ms: {e}");
            Err(e.into())
        }
    }
}

/// Get the image from a multipart upload or, for a JSON body, from `image_url`
async fn receive_upload(state: &Arc<AppState>, request: Request) -> Result<Upload, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let max_size = state.config.max_upload_bytes;

    if content_type.starts_with("multipart/") {
        let multipart = Multipart::from_request(request, state).await?;
        return extract_upload(multipart, max_size).await;
    }

    if content_type.starts_with("application/json") {
        let Json(body) = Json::<ImageUrlRequest>::from_request(request, state).await?;
        let Some(url) = body.image_url.filter(|url| !url.trim().is_empty()) else {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                NO_IMAGE,
                "The JSON body has no image_url",
            ));
        };

        tracing::debug!("Downloading {url}");
        let image = fetch_image(&state.http, &url, max_size).await?;
        let bytes = Bytes::from(image.bytes);
        validate_upload_content(&bytes, max_size)?;
        return Ok(Upload {
            filename: image.filename,
            bytes,
        });
    }

    Err(ApiError::new(
        StatusCode::BAD_REQUEST,
        NO_IMAGE,
        format!(
            "Send a multipart form with a file field named '{IMAGE_FIELD}' or a JSON body with image_url"
        ),
    ))
}

/// Pull the image out of the multipart form.
///
/// The upload is the field named [`IMAGE_FIELD`], or failing that the first
/// field that carries a filename. Any other field is skipped.
async fn extract_upload(mut multipart: Multipart, max_size: usize) -> Result<Upload, ApiError> {
    let mut fields_received = 0usize;
    let mut fallback: Option<Upload> = None;

    loop {
        if fields_received >= MAX_MULTIPART_FIELDS {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Too many form fields",
                format!("At most {MAX_MULTIPART_FIELDS} fields are accepted"),
            ));
        }

        let Some(field) = multipart.next_field().await? else {
            break;
        };
        fields_received += 1;

        let is_image_field = field.name() == Some(IMAGE_FIELD);
        let has_filename = field.file_name().is_some();
        if !is_image_field && (!has_filename || fallback.is_some()) {
            continue;
        }

        let filename = field.file_name().map(ToString::to_string);
        let bytes = field.bytes().await?;
        let upload = Upload { filename, bytes };

        if is_image_field {
            validate_upload_content(&upload.bytes, max_size)?;
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    if let Some(upload) = fallback {
        validate_upload_content(&upload.bytes, max_size)?;
        return Ok(upload);
    }

    let details = if fields_received == 0 {
        "The form was empty".to_string()
    } else {
        format!("Send the image in a file field named '{IMAGE_FIELD}'")
    };
    Err(ApiError::new(StatusCode::BAD_REQUEST, NO_IMAGE, details))
}

/// Write the upload to a fresh, uniquely named temporary file.
///
/// The returned [`TempPath`] deletes the file when dropped.
async fn stage_upload(upload: &Upload, dir: Option<&Path>) -> Result<TempPath, ApiError> {
    let suffix = upload_suffix(upload.filename.as_deref(), &upload.bytes);
    let dir = dir.map(Path::to_path_buf);

    let path = tokio::task::spawn_blocking(move || {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);
        match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map(tempfile::NamedTempFile::into_temp_path)
    })
    .await
    .map_err(|e| ApiError::internal("Failed to store upload", e.to_string()))?
    .map_err(|e| ApiError::internal("Failed to store upload", e.to_string()))?;

    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to store upload", e.to_string()))?;

    Ok(path)
}

/// Delete a staged upload; failures are logged and otherwise ignored
fn release_upload(path: TempPath) {
    let shown = path.display().to_string();
    match path.close() {
        Ok(()) => tracing::debug!("Removed staged upload {shown}"),
        Err(e) => tracing::warn!("Failed to remove staged upload {shown}: {e}"),
    }
}
