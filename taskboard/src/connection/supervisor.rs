//! Background task driving one [`super::Connection`].
//!
//! Connect, pump frames until the socket ends, then either stop (local close,
//! normal server close, receiver gone) or retry after the policy delay. The
//! retry counter resets on every successful open.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use zeroize::Zeroizing;

use taskboard_proto::frame::Frame;

use super::{Channel, ConnectionStatus, Outbound, ReconnectPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(super) struct Supervisor {
    pub channel: Channel,
    pub url: Url,
    pub bearer: Zeroizing<String>,
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub status: watch::Sender<ConnectionStatus>,
    pub inbound: mpsc::Sender<Frame>,
    pub outbound: Outbound,
    pub shutdown: watch::Receiver<bool>,
}

/// Why a socket stopped being pumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketEnd {
    /// Closed locally.
    Shutdown,
    /// Nobody reads inbound frames any more.
    ReceiverGone,
    /// Server sent a `1000` close.
    Normal,
    /// Any other close, read error, or write error.
    Abnormal,
}

pub(super) async fn run(mut sv: Supervisor) {
    let channel = sv.channel;
    let mut attempt: u32 = 0;

    let final_status = loop {
        if *sv.shutdown.borrow() {
            break ConnectionStatus::Closed;
        }

        let opened = tokio::select! {
            _ = sv.shutdown.changed() => break ConnectionStatus::Closed,
            opened = open(&sv.url, &sv.bearer, sv.connect_timeout) => opened,
        };

        match opened {
            Ok(ws) => {
                attempt = 0;
                tracing::info!(%channel, url = %sv.url, "WebSocket connected");
                let end = pump(&mut sv, ws).await;
                sv.outbound.lock().take();
                match end {
                    SocketEnd::Shutdown | SocketEnd::ReceiverGone => {
                        break ConnectionStatus::Closed;
                    }
                    SocketEnd::Normal => {
                        tracing::info!(%channel, "WebSocket closed normally by server");
                        break ConnectionStatus::Disconnected;
                    }
                    SocketEnd::Abnormal => {
                        tracing::warn!(%channel, "WebSocket closed unexpectedly");
                    }
                }
            }
            Err(reason) => {
                tracing::warn!(%channel, url = %sv.url, attempt, err = %reason, "WebSocket connect failed");
            }
        }

        attempt += 1;
        if attempt > sv.policy.max_attempts {
            tracing::warn!(
                %channel,
                max_attempts = sv.policy.max_attempts,
                "giving up on WebSocket after exhausting retries"
            );
            break ConnectionStatus::Disconnected;
        }
        sv.status.send_replace(ConnectionStatus::Reconnecting {
            attempt,
            max_attempts: sv.policy.max_attempts,
        });
        tracing::info!(%channel, attempt, delay_ms = duration_ms(sv.policy.delay), "retrying WebSocket");

        tokio::select! {
            _ = sv.shutdown.changed() => break ConnectionStatus::Closed,
            () = tokio::time::sleep(sv.policy.delay) => {}
        }
    };

    sv.outbound.lock().take();
    sv.status.send_replace(final_status);
    tracing::debug!(%channel, status = %final_status, "connection supervisor exiting");
}

/// One connect attempt, bounded by the connect timeout.
async fn open(url: &Url, bearer: &str, timeout: Duration) -> Result<WsStream, String> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| e.to_string())?;
    let mut bearer = HeaderValue::from_str(bearer).map_err(|e| e.to_string())?;
    bearer.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (ws, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| "connect timed out".to_string())?
        .map_err(|e| describe_connect_error(&e))?;
    Ok(ws)
}

/// Pumps frames in both directions until the socket ends.
async fn pump(sv: &mut Supervisor, ws: WsStream) -> SocketEnd {
    let channel = sv.channel;
    let (mut sink, mut stream) = ws.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
    *sv.outbound.lock() = Some(writer_tx);
    sv.status.send_replace(ConnectionStatus::Connected);

    loop {
        tokio::select! {
            _ = sv.shutdown.changed() => {
                let _ = sink.close().await;
                return SocketEnd::Shutdown;
            }
            Some(message) = writer_rx.recv() => {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(%channel, err = %e, "WebSocket write failed");
                    return SocketEnd::Abnormal;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                    Ok(frame) => {
                        if sv.inbound.send(frame).await.is_err() {
                            let _ = sink.close().await;
                            return SocketEnd::ReceiverGone;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%channel, err = %e, "malformed frame, skipping");
                    }
                },
                Some(Ok(Message::Close(close))) => {
                    let code = close.as_ref().map(|c| c.code);
                    tracing::debug!(%channel, ?code, "close frame received");
                    return if code == Some(CloseCode::Normal) {
                        SocketEnd::Normal
                    } else {
                        SocketEnd::Abnormal
                    };
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!(%channel, "ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(%channel, err = %e, "WebSocket read error");
                    return SocketEnd::Abnormal;
                }
                None => return SocketEnd::Abnormal,
            }
        }
    }
}

fn describe_connect_error(err: &tungstenite::Error) -> String {
    match err {
        tungstenite::Error::Http(response) => {
            format!("handshake rejected: status {}", response.status())
        }
        tungstenite::Error::Io(io) => format!("I/O error: {io}"),
        other => other.to_string(),
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
