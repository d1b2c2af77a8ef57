use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use folio::build::{build_site, BuildInfo, Cancellation};
use folio::config::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Builds a blog from a directory of markdown posts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site
    Build {
        /// The project directory, or any directory beneath it
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// The output directory; defaults to `_output` in the current
        /// directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The number of worker threads used to build posts
        #[arg(short, long)]
        threads: Option<usize>,

        /// The build time exposed to templates (RFC 3339); defaults to now
        #[arg(long, value_parser = parse_build_time)]
        build_time: Option<DateTime<FixedOffset>>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Build {
            directory,
            output,
            threads,
            build_time,
        } => {
            let output = match output {
                Some(output) => output,
                None => std::env::current_dir()
                    .context("Getting current directory")?
                    .join("_output"),
            };
            let config = Config::from_directory(&directory, &output, threads)?;

            let cancellation = Cancellation::new();
            let handler = cancellation.clone();
            ctrlc::set_handler(move || handler.cancel())
                .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))?;

            let info = BuildInfo {
                build_time: build_time.unwrap_or_else(|| Utc::now().fixed_offset()),
            };
            let report = build_site(&config, &info, &cancellation)
                .with_context(|| format!("Building site into `{}`", output.display()))?;
            info!(
                posts = report.posts,
                drafts = report.drafts,
                pages = report.pages,
                "Done"
            );
            Ok(())
        }
    }
}

fn parse_build_time(s: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|err| format!("`{}`: {}", s, err))
}
