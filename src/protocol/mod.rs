// src/protocol/mod.rs
// =============================================================================
// The content exchange protocol between the crawler and a renderer.
//
// Submodules:
// - messages: the JSON message kinds and their wire format
// - heartbeat: ping/pong liveness tracking for one connection
//
// The transport is a WebSocket that can drop at any time. Nothing in the
// protocol depends on every message arriving: a renderer that misses a
// processed_content simply asks for it again with request_content.
// =============================================================================

mod heartbeat;
mod messages;

pub use heartbeat::{Heartbeat, HeartbeatAction, HEARTBEAT_CLOSE_CODE, HEARTBEAT_CLOSE_REASON};
pub use messages::{ClientMessage, ProcessedContent, ServerMessage};
