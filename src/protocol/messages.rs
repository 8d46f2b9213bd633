// src/protocol/messages.rs
// =============================================================================
// The JSON messages exchanged between the crawl server and a renderer.
//
// Every message is a JSON object with a "type" field:
//
//   renderer -> crawler              crawler -> renderer
//   -------------------              -------------------
//   start_crawl {url}                link {data: url}
//   request_content {url}            processed_content {data: {url, html, resources}}
//   ping {timestamp} / pong          crawling_complete {data: null}
//                                    error {data: message}
//                                    info {data: message}
//                                    ping {timestamp} / pong
//
// Resource bytes are base64 strings on the wire, since JSON has no binary type.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Messages a renderer (or any other client) sends to the crawl server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartCrawl {
        url: String,
    },
    RequestContent {
        url: String,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Messages the crawl server sends out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Link { data: String },
    ProcessedContent { data: ProcessedContent },
    CrawlingComplete { data: () },
    Error { data: String },
    Info { data: String },
    Ping { timestamp: i64 },
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// A sanitized page plus the static resources it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub url: String,
    pub html: String,
    #[serde(default, with = "base64_resources")]
    pub resources: BTreeMap<String, Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ServerMessage {
    pub fn link(url: impl Into<String>) -> Self {
        ServerMessage::Link { data: url.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            data: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        ServerMessage::Info {
            data: message.into(),
        }
    }

    pub fn complete() -> Self {
        ServerMessage::CrawlingComplete { data: () }
    }

    pub fn ping_now() -> Self {
        ServerMessage::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        to_json(self)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        to_json(self)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// Our message types only have string map keys, so serialization can't fail
// in practice. If it ever does, the peer gets an error message instead.
fn to_json<T: Serialize>(message: &T) -> String {
    serde_json::to_string(message).unwrap_or_else(|e| {
        format!(
            r#"{{"type":"error","data":{}}}"#,
            serde_json::Value::String(format!("failed to encode message: {}", e))
        )
    })
}

mod base64_resources {
    use std::collections::BTreeMap;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(resources: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<&str, String> = resources
            .iter()
            .map(|(url, bytes)| (url.as_str(), STANDARD.encode(bytes)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(url, text)| {
                STANDARD
                    .decode(text.as_bytes())
                    .map(|bytes| (url, bytes))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_messages_parse() {
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"start_crawl","url":"https://example.com"}"#)
                .unwrap(),
            ClientMessage::StartCrawl {
                url: "https://example.com".to_string()
            }
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"pong"}"#).unwrap(),
            ClientMessage::Pong { timestamp: None }
        );
    }

    #[test]
    fn test_unknown_type_is_a_protocol_error() {
        let err = ClientMessage::from_json(r#"{"type":"self_destruct"}"#).unwrap_err();
        assert!(err.to_string().starts_with("Invalid message"));
        assert!(ClientMessage::from_json("not json").is_err());
        assert!(ClientMessage::from_json(r#"{"type":"start_crawl"}"#).is_err());
    }

    #[test]
    fn test_outbound_wire_shapes() {
        let link: serde_json::Value = serde_json::from_str(&ServerMessage::link("https://example.com/a/").to_json()).unwrap();
        assert_eq!(link, json!({"type": "link", "data": "https://example.com/a/"}));

        let done: serde_json::Value = serde_json::from_str(&ServerMessage::complete().to_json()).unwrap();
        assert_eq!(done, json!({"type": "crawling_complete", "data": null}));

        let error: serde_json::Value = serde_json::from_str(&ServerMessage::error("boom").to_json()).unwrap();
        assert_eq!(error, json!({"type": "error", "data": "boom"}));

        let ping: serde_json::Value = serde_json::from_str(&ServerMessage::ping_now().to_json()).unwrap();
        assert_eq!(ping["type"], "ping");
        assert!(ping["timestamp"].is_i64());
    }

    #[test]
    fn test_processed_content_carries_base64_resources() {
        let mut resources = BTreeMap::new();
        resources.insert("https://example.com/site.css".to_string(), b"body{}".to_vec());
        let message = ServerMessage::ProcessedContent {
            data: ProcessedContent {
                url: "https://example.com/".to_string(),
                html: "<p>hi</p>".to_string(),
                resources,
                fetched_at: None,
            },
        };

        let text = message.to_json();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "processed_content");
        assert_eq!(value["data"]["resources"]["https://example.com/site.css"], "Ym9keXt9");

        assert_eq!(ServerMessage::from_json(&text).unwrap(), message);
    }
}
