use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voxmeet::{
    create_router, AppState, Config, FixedWindowQuota, GoogleSpeech, MeetManager,
    OpenAiReplyGenerator, SqliteStore, SystemClock, TurnEngine,
};

#[derive(Debug, Parser)]
#[command(name = "voxmeet", about = "Timed AI interview meet backend")]
struct Args {
    /// Configuration file (without extension), also overridable via
    /// VOXMEET__* environment variables
    #[arg(long, default_value = "config/voxmeet")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);
    info!(
        "HTTP server will bind to {}:{}",
        cfg.service.http.bind, cfg.service.http.port
    );

    if let Some(parent) = Path::new(&cfg.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
    }
    let store = Arc::new(SqliteStore::open(&cfg.database.path)?);
    info!("Database ready at {}", cfg.database.path);

    // Adapters are constructed once here and injected; nothing is
    // lazily initialized behind a global.
    let speech = Arc::new(GoogleSpeech::new(cfg.speech.clone())?);
    let replies = Arc::new(OpenAiReplyGenerator::new(cfg.reply.clone())?);
    let quota = Arc::new(FixedWindowQuota::new(
        cfg.quota.max_turns,
        Duration::from_secs(cfg.quota.window_secs),
    ));
    let clock = Arc::new(SystemClock);

    let manager = Arc::new(MeetManager::new(
        store.clone(),
        clock.clone(),
        chrono::Duration::seconds(cfg.meet.window_secs as i64),
        cfg.meet.code_length,
    ));
    let engine = Arc::new(TurnEngine::new(
        store.clone(),
        store.clone(),
        speech,
        replies,
        quota,
        clock,
    ));

    let state = AppState::new(cfg.service.name.clone(), manager, engine, store);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
