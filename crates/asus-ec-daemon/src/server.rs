//! Loopback TCP server handing out the cached snapshot.
//!
//! Connecting is the request: each connection receives one JSON object and
//! is closed. Nothing is read from the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::cache::SensorCache;

/// Upper bound on delivering one response to a client.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts connections forever, answering each on its own task.
pub async fn serve(listener: TcpListener, cache: Arc<SensorCache>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                // Per-connection failures (e.g. reset before accept) are not fatal.
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let cache = cache.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, &cache).await {
                debug!("Failed to answer {}: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    cache: &SensorCache,
) -> std::io::Result<()> {
    let payload = cache.get().to_json()?;
    tokio::time::timeout(WRITE_TIMEOUT, async {
        stream.write_all(payload.as_bytes()).await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "client stalled"))??;
    debug!("Sent {} bytes to {}", payload.len(), peer);
    Ok(())
}
