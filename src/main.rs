use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use vodview::api::ApiClient;
use vodview::app::{App, AppEvent};
use vodview::config::Config;
use vodview::feed::{dump_feed, FeedPaginator};

/// Get the config directory path (~/.config/vodview/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("vodview"))
}

#[derive(Parser, Debug)]
#[command(name = "vodview", about = "Terminal client for a video-on-demand backend")]
struct Args {
    /// Config file (default: ~/.config/vodview/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the config file
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Walk the feed and print one line per video instead of starting the TUI
    #[arg(long)]
    dump_feed: bool,

    /// Stop the dump after this many pages
    #[arg(long, value_name = "N", requires = "dump_feed")]
    max_pages: Option<usize>,
}

/// Route logs to stderr for the dump, or to a file while the TUI owns the
/// screen.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !args.dump_feed && !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let log_path = config_dir.join("vodview.log");
    init_tracing((!args.dump_feed).then_some(log_path.as_path()))?;

    // The config file may carry an API token: user-only access.
    #[cfg(unix)]
    if config_dir.exists() {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides();
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }

    let api = ApiClient::from_config(&config).context("Invalid backend configuration")?;
    tracing::info!(base = %api.base_url(), "Starting vodview");

    if args.dump_feed {
        let mut feed = FeedPaginator::new(Arc::new(api), config.page_size);
        let summary = dump_feed(&mut feed, args.max_pages, &mut std::io::stdout()).await?;
        eprintln!("{}", summary);
        return Ok(());
    }

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(100);
    let mut app = App::new(&config, api);
    vodview::ui::run(&mut app, event_tx, event_rx).await?;

    tracing::info!("vodview exited");
    Ok(())
}
