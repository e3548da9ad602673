//! The RESP2 TCP listener: one task per connection, each looping
//! read → dispatch → write until the client disconnects or sends a
//! frame the protocol can't parse.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::resp::dispatcher::dispatch;
use crate::resp::{read_command, write_reply, FrameError, RespValue};
use crate::state::AppState;

/// Binds `addr` and serves RESP2 connections until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot bind to `addr`.
pub async fn serve(
    addr: std::net::SocketAddr,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "RESP2 listener bound");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let state = Arc::clone(&state);
                let mut connection_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        () = handle_connection(socket, &state) => {}
                        _ = connection_shutdown.changed() => {}
                    }
                    tracing::debug!(%peer, "connection closed");
                });
            }
            _ = shutdown.changed() => {
                tracing::info!("RESP2 listener shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, state: &Arc<AppState>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let command = match read_command(&mut reader).await {
            Ok(Some(args)) => args,
            Ok(None) => return,
            Err(FrameError::Closed) => return,
            Err(err) => {
                let reply = RespValue::Error(format!("ERR protocol error: {err}"));
                let _ = write_reply(&mut write_half, &reply).await;
                let _ = write_half.shutdown().await;
                return;
            }
        };

        let reply = dispatch(&command, state);
        if write_reply(&mut write_half, &reply).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use chronos_core::{ChronosConfig, LatencyHistogram, Prefetcher, Store, TtlController};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::loader::NullDataLoader;
    use crate::state::{initial_health_report, EvictionRate};

    fn test_state() -> Arc<AppState> {
        let config = ChronosConfig::default();
        let store = Arc::new(Store::new(&config.store));
        let prefetcher = Arc::new(Prefetcher::new(config.prefetch, Arc::clone(&store), Arc::new(NullDataLoader)));
        Arc::new(AppState {
            store,
            prefetcher,
            ttl_controller: Arc::new(TtlController::new(config.ttl)),
            latency: Arc::new(LatencyHistogram::new()),
            eviction_rate: Arc::new(EvictionRate::new(0)),
            health: Arc::new(RwLock::new(initial_health_report())),
            max_key_bytes: config.store.max_key_bytes,
            max_value_bytes: config.store.max_value_bytes,
        })
    }

    #[tokio::test]
    async fn serves_a_set_and_get_round_trip() {
        let state = test_state();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server_state = Arc::clone(&state);
        let server = tokio::spawn(async move { serve(addr, server_state, shutdown_rx).await });

        // give the listener a moment to bind before connecting
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n").await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        stream.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$1\r\nv\r\n");

        let _ = shutdown_tx.send(true);
        let _ = server.await;
    }
}
