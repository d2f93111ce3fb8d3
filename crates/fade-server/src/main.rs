mod api;
mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fade_protocol::{ChatRoom, MemoryStore, MessageStore, RoomConfig, SqliteStore};

#[derive(Parser)]
#[command(name = "fade-server", about = "FadeChat ephemeral group chat server")]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "FADECHAT_BIND", default_value = "0.0.0.0")]
    bind: std::net::IpAddr,

    /// SQLite database file for messages.
    #[arg(long, env = "FADECHAT_DB", default_value = "db/messages.sqlite3")]
    db: PathBuf,

    /// Keep messages in memory only (nothing written to disk).
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn MessageStore> = if cli.memory {
        tracing::info!("using in-memory message store");
        Arc::new(MemoryStore::new())
    } else {
        if let Some(dir) = cli.db.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Arc::new(
            SqliteStore::open(&cli.db)
                .with_context(|| format!("opening {}", cli.db.display()))?,
        )
    };

    let room = ChatRoom::new(store, RoomConfig::new());
    let handle = room.start();

    let addr = SocketAddr::new(cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "fade-server v{} listening", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, api::router(handle.room().clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl+C received, shutting down");
        })
        .await?;

    handle.shutdown().await;
    Ok(())
}
