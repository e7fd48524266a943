use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::Value;

use crate::catalog::store::ProductCatalog;
use crate::catalog::url_check::{self, UrlStatus, DEFAULT_CHECK_TIMEOUT};
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommands,
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// List all products in the catalog
    List {
        /// Path to catalog file
        #[arg(long, env = "CATALOG_PATH", default_value = "products.json")]
        catalog: PathBuf,
    },

    /// Print the number of products in the catalog
    Count {
        /// Path to catalog file
        #[arg(long, env = "CATALOG_PATH", default_value = "products.json")]
        catalog: PathBuf,
    },

    /// Check that the catalog loads the way the server would load it
    Validate {
        /// Path to catalog file
        #[arg(long, env = "CATALOG_PATH", default_value = "products.json")]
        catalog: PathBuf,
    },

    /// Send a HEAD request to every product link and report which still answer
    CheckUrls {
        /// Path to catalog file
        #[arg(long, env = "CATALOG_PATH", default_value = "products.json")]
        catalog: PathBuf,

        /// Product field holding the link
        #[arg(long, default_value = "url")]
        field: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = DEFAULT_CHECK_TIMEOUT.as_secs())]
        timeout: u64,

        /// Also write the report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

/// Execute catalog subcommand
///
/// # Errors
///
/// Returns an error if the catalog cannot be read or parsed.
pub fn run(args: CatalogArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        CatalogCommands::List { catalog } => run_list(&catalog, format, verbose),
        CatalogCommands::Count { catalog } => run_count(&catalog, format),
        CatalogCommands::Validate { catalog } => run_validate(&catalog, format),
        CatalogCommands::CheckUrls {
            catalog,
            field,
            timeout,
            report,
        } => run_check_urls(
            &catalog,
            &field,
            Duration::from_secs(timeout),
            report.as_deref(),
            format,
        ),
    }
}

fn load(path: &std::path::Path) -> anyhow::Result<ProductCatalog> {
    ProductCatalog::load_from_file(path)
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
}

fn run_list(path: &std::path::Path, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let catalog = load(path)?;

    if verbose {
        eprintln!("Loaded catalog with {} products", catalog.len());
    }

    match format {
        OutputFormat::Json => println!("{}", catalog.to_json()?),
        OutputFormat::Text => {
            let rows: Vec<(String, String, String)> = catalog
                .products()
                .iter()
                .map(|p| (field(p, "id"), field(p, "name"), field(p, "category")))
                .collect();

            let id_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(2).max(2);
            let name_width = rows
                .iter()
                .map(|r| r.1.len().min(40))
                .max()
                .unwrap_or(4)
                .max(4);

            println!("Product Catalog ({} products)\n", rows.len());
            println!(
                "{:<id_w$} {:<name_w$} Category",
                "ID",
                "Name",
                id_w = id_width,
                name_w = name_width
            );
            println!("{}", "-".repeat(id_width + name_width + 10));

            for (id, name, category) in &rows {
                println!(
                    "{:<id_w$} {:<name_w$} {}",
                    id,
                    truncate(name, name_width),
                    category,
                    id_w = id_width,
                    name_w = name_width
                );
            }
        }
    }

    Ok(())
}

fn run_count(path: &std::path::Path, format: OutputFormat) -> anyhow::Result<()> {
    let catalog = load(path)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "count": catalog.len() })),
        OutputFormat::Text => println!("{}", catalog.len()),
    }
    Ok(())
}

fn run_validate(path: &std::path::Path, format: OutputFormat) -> anyhow::Result<()> {
    let catalog = load(path)?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "valid": true, "count": catalog.len() })
        ),
        OutputFormat::Text => println!(
            "OK: {} is a valid catalog with {} products",
            path.display(),
            catalog.len()
        ),
    }
    Ok(())
}

fn run_check_urls(
    path: &std::path::Path,
    field: &str,
    timeout: Duration,
    report: Option<&std::path::Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let catalog = load(path)?;
    let urls = url_check::product_urls(&catalog, field);
    tracing::info!(
        "Checking {} of {} products with a '{}' link",
        urls.len(),
        catalog.len(),
        field
    );

    let client = url_check::check_client(timeout)?;
    let rt = tokio::runtime::Runtime::new()?;
    let reports = rt.block_on(url_check::check_urls(&client, &urls));

    let rendered = match format {
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            let mut out = String::new();
            for line in reports.iter().map(url_check::UrlReport::line) {
                out.push_str(&line);
                out.push('\n');
            }
            let active = reports
                .iter()
                .filter(|r| r.status == UrlStatus::Active)
                .count();
            out.push_str(&format!(
                "\n{active} of {} links active\n",
                reports.len()
            ));
            out
        }
    };
    print!("{rendered}");

    if let Some(report_path) = report {
        std::fs::write(report_path, &rendered)
            .map_err(|e| anyhow::anyhow!("{}: {e}", report_path.display()))?;
        tracing::info!("Report written to {}", report_path.display());
    }

    Ok(())
}

/// Render a top-level field of a product for table output
fn field(product: &Value, key: &str) -> String {
    match product.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
