// src/render/service.rs
// =============================================================================
// The renderer process: one actor task plus an HTTP API.
//
// The actor owns the RenderCoordinator. Nothing else touches it, so there
// are no locks around the queue. It reacts to two inputs:
// - Commands from HTTP handlers (screenshot this URL, start a crawl)
// - LinkEvents from the crawler link (pages, links, completion, reconnects)
//
// Whenever the coordinator says a request is ready, the actor spawns a task
// that asks the RenderEngine for a PNG and sends it back to the waiting
// HTTP handler through a oneshot channel.
//
// HTTP API:
//   POST /api/screenshot {"url": "..."}  -> 200 image/png
//                                          400 {"error": "URL is required"}
//                                          500 {"error": "Failed to take screenshot", "details": "..."}
//                                          504 when the page never arrives
//   POST /api/crawl {"url": "..."}       -> 202, forwards start_crawl
//   GET  /health                         -> "ok"
//
// Rust concepts:
// - The actor pattern: state owned by one task, driven through channels
// - oneshot channels to return a result to exactly one waiter
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::cache::ContentCache;
use super::coordinator::{RenderCoordinator, RenderReply, Step};
use super::engine::{inline_stylesheets, BrowserlessEngine, RenderEngine};
use super::link::{run_link, LinkEvent};
use super::Viewport;
use crate::config::RendererConfig;
use crate::crawl::{normalize, CrawlUrl};
use crate::error::RenderError;
use crate::protocol::{ClientMessage, ServerMessage};

const COMMAND_BUFFER: usize = 64;

pub enum Command {
    Screenshot { url: CrawlUrl, reply: RenderReply },
    StartCrawl { url: CrawlUrl },
}

/// Cheap, cloneable access to the renderer actor.
#[derive(Clone)]
pub struct RendererHandle {
    commands: mpsc::Sender<Command>,
}

impl RendererHandle {
    /// Starts the actor. It runs until every handle is dropped.
    pub fn spawn(
        coordinator: RenderCoordinator,
        engine: Arc<dyn RenderEngine>,
        viewport: Viewport,
        link_events: mpsc::UnboundedReceiver<LinkEvent>,
        outgoing: mpsc::UnboundedSender<ClientMessage>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = RendererActor {
            coordinator,
            engine,
            viewport,
            outgoing,
        };
        tokio::spawn(actor.run(commands_rx, link_events));
        Self { commands }
    }

    /// Queues a screenshot. The receiver resolves once the page has rendered.
    pub async fn screenshot(
        &self,
        url: CrawlUrl,
    ) -> Result<oneshot::Receiver<Result<Vec<u8>, RenderError>>, RenderError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Screenshot { url, reply })
            .await
            .map_err(|_| RenderError::Cancelled)?;
        Ok(rx)
    }

    pub async fn start_crawl(&self, url: CrawlUrl) -> Result<(), RenderError> {
        self.commands
            .send(Command::StartCrawl { url })
            .await
            .map_err(|_| RenderError::Cancelled)
    }
}

struct RendererActor {
    coordinator: RenderCoordinator,
    engine: Arc<dyn RenderEngine>,
    viewport: Viewport,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl RendererActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = link_events.recv() => self.handle_link_event(event),
            }
        }
        debug!("renderer actor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Screenshot { url, reply } => {
                let step = self.coordinator.enqueue(url.clone(), reply);
                info!(url = %url, queued = self.coordinator.queued(), "screenshot requested");
                self.apply(step);
            }
            Command::StartCrawl { url } => {
                info!(url = %url, "starting crawl");
                self.coordinator.on_crawl_started();
                self.send(ClientMessage::StartCrawl {
                    url: url.to_string(),
                });
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        let message = match event {
            LinkEvent::Connected => {
                for request in self.coordinator.on_reconnected() {
                    self.send(request);
                }
                return;
            }
            LinkEvent::Message(message) => message,
        };

        match message {
            ServerMessage::Link { data } => match normalize(&data, None) {
                Some(url) => self.coordinator.on_link(url),
                None => debug!(url = %data, "ignoring unusable link"),
            },
            ServerMessage::ProcessedContent { data } => {
                let step = self.coordinator.on_processed_content(data);
                self.apply(step);
            }
            ServerMessage::CrawlingComplete { .. } => {
                info!(pending = self.coordinator.pending(), "crawler finished");
                let step = self.coordinator.on_crawling_complete();
                self.apply(step);
            }
            ServerMessage::Error { data } => warn!(message = %data, "crawler reported an error"),
            ServerMessage::Info { data } => debug!(message = %data, "crawler progress"),
            // The link answers heartbeats itself
            ServerMessage::Ping { .. } | ServerMessage::Pong { .. } => {}
        }
    }

    fn send(&self, message: ClientMessage) {
        if self.outgoing.send(message).is_err() {
            warn!("crawler link is gone; message dropped");
        }
    }

    fn apply(&self, step: Step) {
        for request in step.requests {
            self.send(request);
        }

        for render in step.renders {
            let engine = Arc::clone(&self.engine);
            let viewport = self.viewport;

            tokio::spawn(async move {
                let html = inline_stylesheets(&render.content.html, &render.content.resources);
                let result = engine
                    .render_page(&html, render.url.as_str(), &viewport)
                    .await;
                match &result {
                    Ok(png) => info!(url = %render.url, bytes = png.len(), "screenshot taken"),
                    Err(e) => warn!(url = %render.url, error = %e, "screenshot failed"),
                }
                let _ = render.reply.send(result);
            });
        }
    }
}

#[derive(Clone)]
struct ApiState {
    renderer: RendererHandle,
    screenshot_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UrlBody {
    #[serde(default)]
    url: Option<String>,
}

pub fn api_router(renderer: RendererHandle, screenshot_timeout: Duration) -> Router {
    let state = ApiState {
        renderer,
        screenshot_timeout,
    };
    Router::new()
        .route("/api/screenshot", post(screenshot))
        .route("/api/crawl", post(start_crawl))
        .route("/health", get(health))
        .with_state(state)
}

// Missing body, missing field, and unparseable URLs are all the same 400
fn target_url(body: Result<Json<UrlBody>, JsonRejection>) -> Option<CrawlUrl> {
    let Json(body) = body.ok()?;
    let url = normalize(body.url?.trim(), None)?;
    let web = url.as_str().starts_with("http://") || url.as_str().starts_with("https://");
    web.then_some(url)
}

fn url_required() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "URL is required" })),
    )
        .into_response()
}

fn screenshot_failed(err: &RenderError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to take screenshot", "details": err.to_string() })),
    )
        .into_response()
}

async fn screenshot(
    State(state): State<ApiState>,
    body: Result<Json<UrlBody>, JsonRejection>,
) -> Response {
    let Some(url) = target_url(body) else {
        return url_required();
    };

    let rx = match state.renderer.screenshot(url.clone()).await {
        Ok(rx) => rx,
        Err(e) => return screenshot_failed(&e),
    };

    match tokio::time::timeout(state.screenshot_timeout, rx).await {
        Ok(Ok(Ok(png))) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(Ok(Err(e))) => screenshot_failed(&e),
        Ok(Err(_)) => screenshot_failed(&RenderError::Cancelled),
        Err(_) => {
            warn!(url = %url, "page content never arrived");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": "Timed out waiting for page content",
                    "url": url.as_str(),
                })),
            )
                .into_response()
        }
    }
}

async fn start_crawl(
    State(state): State<ApiState>,
    body: Result<Json<UrlBody>, JsonRejection>,
) -> Response {
    let Some(url) = target_url(body) else {
        return url_required();
    };

    match state.renderer.start_crawl(url.clone()).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "crawl started", "url": url.as_str() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Wires up the link, the actor, and the HTTP API, then serves forever.
pub async fn run_renderer(config: RendererConfig) -> Result<()> {
    let engine: Arc<dyn RenderEngine> = Arc::new(BrowserlessEngine::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
        config.render_timeout,
    )?);
    let cache = Arc::new(ContentCache::new(config.cache_max_entries));

    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_link(
        config.crawler_url.clone(),
        config.reconnect.clone(),
        config.heartbeat.clone(),
        outgoing_rx,
        events_tx,
    ));

    let renderer = RendererHandle::spawn(
        RenderCoordinator::new(cache, config.queue_policy),
        engine,
        config.viewport,
        events_rx,
        outgoing_tx,
    );

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        crawler = %config.crawler_url,
        policy = ?config.queue_policy,
        "renderer listening"
    );

    axum::serve(listener, api_router(renderer, config.screenshot_timeout)).await?;
    Ok(())
}
