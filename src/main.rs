use std::path::Path;
use std::sync::Arc;

use terms_bot::artifacts::ArtifactDir;
use terms_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use terms_bot::config::BotConfig;
use terms_bot::dispatch::Dispatcher;
use terms_bot::profile::{JsonProfileStore, ProfileStore};
use terms_bot::session::{spawn_eviction_task, SessionManager};

/// Log to stderr, or to a daily-rotated file when `log_dir` is set. The
/// returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "terms-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🤖 terms-bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Profiles ─────────────────────────────────────────────────────────
    let store: Arc<dyn ProfileStore> = Arc::new(JsonProfileStore::open(&config.data_path).await);
    eprintln!("   Profiles: {}", config.data_path.display());

    // ── Generated documents ──────────────────────────────────────────────
    let artifacts = ArtifactDir::new(&config.output_dir);
    if let Err(e) = artifacts.ensure_dirs().await {
        eprintln!("   Warning: Could not create output dir: {}", e);
    }
    eprintln!("   Output: {}", config.output_dir.display());

    // ── Sessions ─────────────────────────────────────────────────────────
    let sessions = Arc::new(SessionManager::new(store));
    match config.session_idle_timeout {
        Some(max_idle) => {
            let _eviction_handle = spawn_eviction_task(Arc::clone(&sessions), max_idle);
            eprintln!("   Idle sessions: evicted after {}s", max_idle.as_secs());
        }
        None => eprintln!("   Idle sessions: kept"),
    }

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();

    if config.cli_enabled {
        channels.add(Box::new(CliChannel::new()));
    }

    if let Some(telegram) = config.telegram {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::new(
            telegram.bot_token,
            telegram.allowed_users,
        )));
    }

    eprintln!("   Channels: {}\n", channels.names().join(", "));

    for (name, e) in channels.health_check_all().await {
        tracing::warn!(channel = %name, "Health check failed: {e}");
    }

    let dispatcher = Arc::new(Dispatcher::new(sessions, Some(artifacts)));
    tokio::select! {
        result = dispatcher.run(Arc::new(channels)) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }

    Ok(())
}
