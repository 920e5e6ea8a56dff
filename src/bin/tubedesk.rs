#![forbid(unsafe_code)]

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubedesk::{
    client::HttpPlatform,
    config::{self, DEFAULT_CONFIG_PATH},
    server,
    thumbnail::{self, ThumbnailFile},
};

const DEFAULT_LOG_FILTER: &str = "tubedesk=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage a YouTube video from the browser.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web front-end.
    Serve {
        #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the config file")]
        config: PathBuf,
        #[arg(long = "host", value_name = "ADDR", help = "Override TUBEDESK_HOST")]
        host: Option<String>,
        #[arg(long = "port", value_name = "PORT", help = "Override TUBEDESK_PORT")]
        port: Option<u16>,
    },
    /// Check a local image against the thumbnail requirements.
    CheckThumbnail {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config: config_path,
            host,
            port,
        } => {
            init_tracing();
            let mut settings = config::load_settings_from(&config_path)
                .with_context(|| format!("loading settings from {}", config_path.display()))?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            if settings.access_token.is_none() {
                tracing::warn!("ACCESS_TOKEN is not set; the page will ask for sign-in");
            }
            let platform = Arc::new(HttpPlatform::new(&settings));
            server::serve(&settings, platform).await
        }
        Command::CheckThumbnail { path } => check_thumbnail(&path),
    }
}

fn check_thumbnail(path: &std::path::Path) -> Result<()> {
    let file = ThumbnailFile::from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;
    match thumbnail::validate(&file) {
        Ok(dimensions) => {
            println!(
                "{}: accepted ({}x{}, {} MB, {})",
                path.display(),
                dimensions.width,
                dimensions.height,
                thumbnail::megabytes(file.size()),
                file.media_type
            );
            Ok(())
        }
        Err(rejection) => {
            println!("{}: rejected: {rejection}", path.display());
            std::process::exit(1);
        }
    }
}
