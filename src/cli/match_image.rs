use std::path::PathBuf;

use clap::Args;

use crate::cli::{MatcherArgs, OutputFormat};
use crate::matcher::{MatchError, Matcher};

#[derive(Args)]
pub struct MatchArgs {
    /// Image file to match
    #[arg(required = true)]
    pub image: PathBuf,

    #[command(flatten)]
    pub matcher: MatcherArgs,
}

/// Execute match subcommand
///
/// The image is handed to the matcher in place; no temporary copy is made.
///
/// # Errors
///
/// Returns an error if the image does not exist or the matcher fails.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: MatchArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if !args.image.is_file() {
        anyhow::bail!("Image not found: {}", args.image.display());
    }

    let matcher = args.matcher.build();
    if verbose {
        eprintln!(
            "Running: {} {}",
            matcher.command_line(),
            args.image.display()
        );
    }

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(matcher.match_image(&args.image));

    match result {
        Ok(value) => {
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
                OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&value)?),
            }
            Ok(())
        }
        Err(e) => {
            report_failure(&e, format)?;
            Err(e.into())
        }
    }
}

fn report_failure(error: &MatchError, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "error": error.to_string(),
                "details": error.details(),
            });
            println!("{}", serde_json::to_string(&body)?);
        }
        OutputFormat::Text => {
            let details = error.details();
            if !details.trim().is_empty() {
                eprintln!("{}", details.trim_end());
            }
        }
    }
    Ok(())
}
