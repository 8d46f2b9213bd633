// src/render/link.rs
// =============================================================================
// The renderer's WebSocket link to the crawl server.
//
// run_link keeps one connection open for as long as the renderer runs:
// - connect, report LinkEvent::Connected
// - forward every crawler message (except heartbeats) as LinkEvent::Message
// - send whatever ClientMessages arrive on the outgoing channel
// - answer the crawler's pings, and ping it back on our own schedule
// - when the connection drops, wait and try again, doubling the delay up to
//   a cap; a successful connect resets the delay
//
// Messages that were in flight when the connection dropped are lost. The
// renderer handles that on Connected by asking again for what it still needs.
//
// The loop ends when either channel's other side goes away.
// =============================================================================

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{BackoffConfig, HeartbeatConfig};
use crate::protocol::{
    ClientMessage, Heartbeat, HeartbeatAction, ServerMessage, HEARTBEAT_CLOSE_CODE,
    HEARTBEAT_CLOSE_REASON,
};

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A (re)connection succeeded.
    Connected,
    Message(ServerMessage),
}

// Why a connection ended
enum LinkEnd {
    Disconnected,
    Shutdown,
}

/// Doubling delay between reconnect attempts.
struct Backoff {
    config: BackoffConfig,
    next: Duration,
}

impl Backoff {
    fn new(config: BackoffConfig) -> Self {
        let next = config.initial;
        Self { config, next }
    }

    fn reset(&mut self) {
        self.next = self.config.initial;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.config.max);
        delay
    }
}

pub async fn run_link(
    crawler_url: String,
    backoff: BackoffConfig,
    heartbeat: HeartbeatConfig,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut backoff = Backoff::new(backoff);

    loop {
        if events.is_closed() {
            return;
        }

        match tokio_tungstenite::connect_async(crawler_url.as_str()).await {
            Ok((socket, _response)) => {
                info!(url = %crawler_url, "connected to crawler");
                backoff.reset();
                if events.send(LinkEvent::Connected).is_err() {
                    return;
                }

                match pump(socket, &heartbeat, &mut outgoing, &events).await {
                    LinkEnd::Shutdown => return,
                    LinkEnd::Disconnected => warn!(url = %crawler_url, "lost connection to crawler"),
                }
            }
            Err(e) => warn!(url = %crawler_url, error = %e, "could not connect to crawler"),
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::time::sleep(delay).await;
    }
}

// Runs one connection until it drops or the renderer goes away
async fn pump<S>(
    socket: S,
    heartbeat_config: &HeartbeatConfig,
    outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> LinkEnd
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = Heartbeat::new(heartbeat_config, Instant::now());
    let mut ticker = tokio::time::interval(heartbeat.check_period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let reply = tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text.to_string()) {
                    Ok(ServerMessage::Ping { timestamp }) => Some(ClientMessage::Pong {
                        timestamp: Some(timestamp),
                    }),
                    Ok(ServerMessage::Pong { .. }) => {
                        heartbeat.on_pong();
                        None
                    }
                    Ok(message) => {
                        if events.send(LinkEvent::Message(message)).is_err() {
                            return LinkEnd::Shutdown;
                        }
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "unreadable message from crawler");
                        None
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        info!(code = u16::from(frame.code), reason = %frame.reason, "crawler closed the connection");
                    }
                    return LinkEnd::Disconnected;
                }
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    warn!(error = %e, "crawler connection error");
                    return LinkEnd::Disconnected;
                }
                None => return LinkEnd::Disconnected,
            },

            message = outgoing.recv() => match message {
                Some(message) => Some(message),
                None => {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            },

            _ = ticker.tick() => match heartbeat.poll(Instant::now()) {
                HeartbeatAction::Wait => None,
                HeartbeatAction::SendPing => Some(ClientMessage::Ping {
                    timestamp: Some(chrono::Utc::now().timestamp_millis()),
                }),
                HeartbeatAction::TimedOut => {
                    warn!("crawler stopped answering pings");
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::from(HEARTBEAT_CLOSE_CODE),
                            reason: HEARTBEAT_CLOSE_REASON.into(),
                        })))
                        .await;
                    return LinkEnd::Disconnected;
                }
            },
        };

        if let Some(message) = reply {
            if let Err(e) = sink.send(Message::Text(message.to_json().into())).await {
                warn!(error = %e, "failed to send to crawler");
                return LinkEnd::Disconnected;
            }
        }
    }
}
