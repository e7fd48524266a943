use clap::Parser;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod matcher;
mod utils;
mod web;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("product_match=debug,tower_http=debug,info")
    } else {
        EnvFilter::new("product_match=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        cli::Commands::Serve(args) => {
            web::server::run(args)?;
        }
        cli::Commands::Match(args) => {
            cli::match_image::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Catalog(args) => {
            cli::catalog::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}
