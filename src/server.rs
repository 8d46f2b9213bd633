// src/server.rs
// =============================================================================
// The crawl server: a WebSocket endpoint at /ws.
//
// Every accepted connection gets its own Connection value, which owns at
// most one crawl session. There is no global registry of sockets: when the
// connection ends, everything it owned goes with it (the running crawl
// keeps going in the background until its frontier drains, but its events
// have nowhere to go and are dropped).
//
// One loop per connection waits on four things at once:
// - frames from the client (start_crawl, request_content, ping, pong)
// - events from the current crawl session
// - replies to on-demand content requests
// - the heartbeat timer
//
// Rust concepts:
// - tokio::select! to multiplex several event sources in one task
// - Splitting a WebSocket into a sender half and a receiver half
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{HeartbeatConfig, ServerConfig};
use crate::crawl::{CrawlServices, CrawlSession, EventSink, SessionEvent};
use crate::error::ProtocolError;
use crate::protocol::{
    ClientMessage, Heartbeat, HeartbeatAction, ServerMessage, HEARTBEAT_CLOSE_CODE,
    HEARTBEAT_CLOSE_REASON,
};

/// State shared by all connections.
pub struct ServerState {
    services: CrawlServices,
    heartbeat: HeartbeatConfig,
    next_session: AtomicU64,
}

impl ServerState {
    pub fn new(services: CrawlServices, heartbeat: HeartbeatConfig) -> Self {
        Self {
            services,
            heartbeat,
            next_session: AtomicU64::new(1),
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}

/// Binds the listener and serves until the process is stopped.
pub async fn serve(config: ServerConfig, services: CrawlServices) -> Result<()> {
    let state = Arc::new(ServerState::new(services, config.heartbeat));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %listener.local_addr()?, "crawl server listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

// Per-connection state: the current crawl and the channels feeding the loop
struct Connection {
    id: Uuid,
    state: Arc<ServerState>,
    session: Option<CrawlSession>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    direct_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    // Handles one inbound text frame. Returns the replies to send right away.
    fn handle_text(&mut self, text: &str, heartbeat: &mut Heartbeat) -> Vec<ServerMessage> {
        let message = match ClientMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(connection = %self.id, error = %e, "rejecting inbound message");
                return vec![ServerMessage::error(e.to_string())];
            }
        };

        match message {
            ClientMessage::StartCrawl { url } => self.start_crawl(&url).into_iter().collect(),
            ClientMessage::RequestContent { url } => {
                self.request_content(url);
                Vec::new()
            }
            ClientMessage::Ping { .. } => vec![ServerMessage::Pong {
                timestamp: Some(Utc::now().timestamp_millis()),
            }],
            ClientMessage::Pong { .. } => {
                heartbeat.on_pong();
                Vec::new()
            }
        }
    }

    // Replaces the current crawl. An invalid seed leaves the old one alone.
    fn start_crawl(&mut self, url: &str) -> Option<ServerMessage> {
        let session_id = self.state.next_session.fetch_add(1, Ordering::Relaxed);
        let sink = EventSink::new(session_id, self.session_tx.clone());

        match CrawlSession::start(url, &self.state.services, sink) {
            Ok(session) => {
                if let Some(previous) = self.session.replace(session) {
                    let stats = previous.stats();
                    info!(
                        connection = %self.id,
                        session = previous.id(),
                        visited = stats.visited,
                        pending = stats.pending,
                        in_flight = stats.in_flight,
                        "retiring previous crawl"
                    );
                    previous.retire();
                }
                None
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "crawl not started");
                Some(ServerMessage::error(e.to_string()))
            }
        }
    }

    // Fetches a page on demand; the reply arrives later through direct_tx
    fn request_content(&self, url: String) {
        let services = self.state.services.clone();
        let reply = self.direct_tx.clone();
        let connection = self.id;

        tokio::spawn(async move {
            let message = match services.fetch_content(&url).await {
                Ok(record) => ServerMessage::ProcessedContent {
                    data: record.into_content(),
                },
                Err(e) => {
                    warn!(connection = %connection, url = %url, error = %e, "on-demand fetch failed");
                    ServerMessage::error(e.to_string())
                }
            };
            let _ = reply.send(message);
        });
    }

    // Only events from the current session reach the client
    fn accepts(&self, event: &SessionEvent) -> bool {
        self.session.as_ref().map(CrawlSession::id) == Some(event.session)
    }
}

async fn handle_connection(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel();

    let mut heartbeat = Heartbeat::new(&state.heartbeat, Instant::now());
    let mut ticker = tokio::time::interval(heartbeat.check_period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut conn = Connection {
        id: Uuid::new_v4(),
        state,
        session: None,
        session_tx,
        direct_tx,
    };
    info!(connection = %conn.id, "client connected");

    'connection: loop {
        let outgoing = tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => conn.handle_text(text.as_str(), &mut heartbeat),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => conn.handle_text(text, &mut heartbeat),
                    Err(_) => vec![ServerMessage::error(ProtocolError::NotUtf8.to_string())],
                },
                // Transport-level ping/pong is answered by axum itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Vec::new(),
                Some(Ok(Message::Close(_))) | None => break 'connection,
                Some(Err(e)) => {
                    warn!(connection = %conn.id, error = %e, "receive error");
                    break 'connection;
                }
            },

            Some(event) = session_rx.recv() => {
                if conn.accepts(&event) {
                    vec![event.event.into_message()]
                } else {
                    debug!(connection = %conn.id, session = event.session, "dropping stale session event");
                    Vec::new()
                }
            }

            Some(message) = direct_rx.recv() => vec![message],

            _ = ticker.tick() => match heartbeat.poll(Instant::now()) {
                HeartbeatAction::Wait => Vec::new(),
                HeartbeatAction::SendPing => vec![ServerMessage::ping_now()],
                HeartbeatAction::TimedOut => {
                    info!(connection = %conn.id, "no pong received, closing");
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: HEARTBEAT_CLOSE_CODE,
                            reason: HEARTBEAT_CLOSE_REASON.into(),
                        })))
                        .await;
                    break 'connection;
                }
            },
        };

        for message in outgoing {
            if sender
                .send(Message::Text(message.to_json().into()))
                .await
                .is_err()
            {
                debug!(connection = %conn.id, "send failed, closing");
                break 'connection;
            }
        }
    }

    info!(connection = %conn.id, "client disconnected");
}
