//! Helpers shared by the crate's unit tests.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;

use taskboard_proto::task::MemberId;

use crate::connection::{ConnectionConfig, ConnectionManager, ReconnectPolicy};
use crate::session::Session;

/// A WebSocket server that echoes every text frame back to its sender.
pub async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    format!("ws://{addr}")
}

/// A manager for `ws_url` that never retries.
pub fn manager(ws_url: &str) -> ConnectionManager {
    let config = ConnectionConfig {
        reconnect: ReconnectPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(10),
        },
        ..ConnectionConfig::new(ws_url)
    };
    ConnectionManager::new(config, Session::new(MemberId::new(1), "ana", "tok")).unwrap()
}
