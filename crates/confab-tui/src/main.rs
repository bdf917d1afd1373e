use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use confab_core::auth::StaticTokenProvider;
use confab_core::cache::ConversationCache;
use confab_core::config::{self, CacheConfig, TransportConfig};
use confab_core::controllers::ChatController;
use confab_core::repositories::{JsonSessionRepository, SessionRepository};
use confab_core::transport::{ChatApi, HttpChatTransport};

mod app;
mod ui;

#[derive(Parser)]
#[command(name = "confab", version, about = "Terminal client for the confab chat server")]
struct Args {
    /// Server origin, e.g. http://127.0.0.1:3000
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    endpoint: String,

    /// Model id to chat with (defaults to the first catalogue entry)
    #[arg(long)]
    model: Option<String>,

    /// Bearer token for the server (falls back to $CONFAB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Start with an empty session instead of restoring the persisted one
    #[arg(long)]
    no_restore: bool,
}

/// Route logs to a file: the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .context("could not determine cache directory")?
        .join(config::APP_ID);
    fs::create_dir_all(&log_dir)?;
    let log_file = fs::File::create(log_dir.join("confab-tui.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();

    let token = args.token.or_else(|| std::env::var("CONFAB_TOKEN").ok());
    if token.is_none() {
        info!("no bearer token configured; connecting anonymously");
    }
    let auth = Arc::new(StaticTokenProvider::new(token, Vec::new()));

    let transport_config = TransportConfig::with_base_url(&args.endpoint);
    let transport = Arc::new(HttpChatTransport::new(&transport_config, auth.clone())?);
    let api = Arc::new(ChatApi::new(&transport_config, auth.clone())?);

    let cache_config = CacheConfig::default();
    let repository = Arc::new(JsonSessionRepository::new(cache_config.max_age)?);

    let model = args
        .model
        .unwrap_or_else(|| config::default_model().to_string());
    let mut controller = ChatController::new(ConversationCache::new(), auth, model);

    // A session inside its staleness window is rendered as-is; anything
    // older (or absent) triggers a catalogue refetch on startup.
    let mut refresh_on_start = true;
    if !args.no_restore {
        match repository.load().await {
            Ok(Some(session)) => {
                let fresh = session.age_secs(confab_core::models::now_unix()) as u64
                    <= cache_config.stale_after.as_secs();
                if let Err(err) = controller.restore(session) {
                    warn!(error = %err, "failed to restore session");
                } else if fresh {
                    refresh_on_start = false;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load session"),
        }
    }

    let terminal = ratatui::init();
    let result = app::App::new(controller, transport, api, repository, refresh_on_start)
        .run(terminal)
        .await;
    ratatui::restore();
    result
}
