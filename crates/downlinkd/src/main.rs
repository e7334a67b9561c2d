//! downlinkd — satellite-side demo daemon.
//!
//! Listens for ground-station connections, answers commands against a
//! simulated spacecraft state, and serves file-transfer transactions.
//! The interactive surface is not contractual; the codec and transaction
//! layers underneath are.

mod handler;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use downlink_transport::link::{read_record, write_record};
use downlink_transport::TransactionManager;

use handler::{handle_frame, Outbound};
use state::SatState;

struct Daemon {
    manager: Mutex<TransactionManager>,
    state: Mutex<SatState>,
    file_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=debug cargo run -p downlinkd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let listen = args.next().unwrap_or_else(|| "127.0.0.1:65432".to_string());
    let file_root = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));

    let daemon = Arc::new(Daemon {
        manager: Mutex::new(TransactionManager::new()),
        state: Mutex::new(SatState::new()),
        file_root,
    });

    let listener = TcpListener::bind(&listen).await?;
    tracing::info!(addr = %listen, root = %daemon.file_root.display(), "downlinkd listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::info!(%peer, "ground station connected");
        let daemon = daemon.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(daemon, socket).await {
                tracing::warn!(%peer, error = %e, "connection ended with error");
            } else {
                tracing::info!(%peer, "ground station disconnected");
            }
        });
    }
}

async fn serve_connection(daemon: Arc<Daemon>, socket: tokio::net::TcpStream) -> Result<()> {
    let (mut reader, mut writer) = socket.into_split();

    while let Some(frame) = read_record(&mut reader).await? {
        let replies = handle_frame(&daemon, &frame).await;
        for outbound in replies {
            match outbound {
                Outbound::Frame(frame) => write_record(&mut writer, &frame).await?,
                // Lets the receiver place the record boundary before the
                // fragment burst begins.
                Outbound::Idle(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
    Ok(())
}
