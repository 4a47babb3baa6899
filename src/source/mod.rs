//! Messaging source abstraction and the BlueBubbles HTTP client.
//!
//! The pipeline only talks to a [`MessageSource`]. [`BlueBubblesSource`]
//! implements it against the BlueBubbles server REST API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`ping`](MessageSource::ping) | `GET /api/v1/server/info` |
//! | [`list_contacts`](MessageSource::list_contacts) | `GET /api/v1/contact` |
//! | [`resolve_handle`](MessageSource::resolve_handle) | `GET /api/v1/handle/{address}` |
//! | [`fetch_messages`](MessageSource::fetch_messages) | `POST /api/v1/message/query` |
//!
//! Every request carries the server password as a `password` query
//! parameter, is bounded by `source.timeout_secs`, and is retried with
//! exponential backoff on transport errors, HTTP 429 and 5xx.

pub mod memory;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{ContactRecord, HandleId, MessageRecord};

pub use memory::StaticSource;

/// External service exposing contacts, handles, and messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Check that the source is reachable and the credentials are accepted.
    async fn ping(&self) -> Result<(), SourceError>;

    /// All contacts known to the source.
    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, SourceError>;

    /// Look up the handle bound to `address`. `Ok(None)` when the address
    /// is not registered with the source.
    async fn resolve_handle(&self, address: &str) -> Result<Option<HandleId>, SourceError>;

    /// One page of messages for `handle`. A page shorter than `page_size`
    /// (including an empty one) marks the end of the stream.
    async fn fetch_messages(
        &self,
        handle: &HandleId,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<MessageRecord>, SourceError>;
}

/// BlueBubbles server client.
pub struct BlueBubblesSource {
    client: reqwest::Client,
    base_url: String,
    password: String,
    max_retries: u32,
    backoff: Duration,
}

impl BlueBubblesSource {
    /// Build a client from configuration. Does not touch the network.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            password: config.resolve_password()?,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(500),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// Send a request, retrying retryable failures.
    ///
    /// A 404 is returned to the caller as a response, not an error.
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response, SourceError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 0.5s, 1s, 2s, 4s, ...
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let err = match build()
                .query(&[("password", self.password.as_str())])
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status == StatusCode::NOT_FOUND {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    SourceError::Status {
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => SourceError::from(e),
            };

            if !err.is_retryable() {
                return Err(err);
            }
            warn!(request = what, attempt, error = %err, "source request failed");
            last_err = Some(err);
        }

        Err(last_err
            .unwrap_or_else(|| SourceError::Transport(format!("{} failed after retries", what))))
    }

    async fn json(&self, response: reqwest::Response) -> Result<Value, SourceError> {
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl MessageSource for BlueBubblesSource {
    async fn ping(&self) -> Result<(), SourceError> {
        let url = self.url("server/info");
        let response = self.send("ping", || self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SourceError::Status {
                status: 404,
                body: "server info endpoint not found".to_string(),
            });
        }
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, SourceError> {
        let url = self.url("contact");
        let response = self.send("list_contacts", || self.client.get(&url)).await?;
        let body = self.json(response).await?;
        parse_contacts(body)
    }

    async fn resolve_handle(&self, address: &str) -> Result<Option<HandleId>, SourceError> {
        let url = self.url(&format!("handle/{}", urlencoding::encode(address)));
        let response = self
            .send("resolve_handle", || self.client.get(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(address, "handle not found");
            return Ok(None);
        }
        let body = self.json(response).await?;
        Ok(parse_handle(&body))
    }

    async fn fetch_messages(
        &self,
        handle: &HandleId,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<MessageRecord>, SourceError> {
        let url = self.url("message/query");
        let body = message_query(handle, offset, page_size);
        let response = self
            .send("fetch_messages", || self.client.post(&url).json(&body))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = self.json(response).await?;
        parse_messages(body)
    }
}

/// Request body for one page of a handle's messages, newest first.
fn message_query(handle: &HandleId, offset: usize, page_size: usize) -> Value {
    let handle_arg = match handle.0.parse::<i64>() {
        Ok(n) => json!(n),
        Err(_) => json!(handle.0),
    };
    json!({
        "with": ["handle"],
        "where": [{
            "statement": "message.handle_id = :handleId",
            "args": { "handleId": handle_arg }
        }],
        "sort": "DESC",
        "offset": offset,
        "limit": page_size
    })
}

fn data_array(body: Value) -> Result<Vec<Value>, SourceError> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(SourceError::Decode(format!(
                "expected data array, got {}",
                other
            ))),
        },
        other => Err(SourceError::Decode(format!(
            "expected object response, got {}",
            other
        ))),
    }
}

fn parse_contacts(body: Value) -> Result<Vec<ContactRecord>, SourceError> {
    Ok(decode_contacts(data_array(body)?))
}

fn parse_messages(body: Value) -> Result<Vec<MessageRecord>, SourceError> {
    Ok(decode_messages(data_array(body)?))
}

/// Decode contact records one by one. A malformed field falls back to its
/// default and is logged; it never drops the record or the batch.
pub(crate) fn decode_contacts(items: Vec<Value>) -> Vec<ContactRecord> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let (record, dropped) = ContactRecord::from_value_lenient(item);
            if !dropped.is_empty() {
                warn!(index, fields = ?dropped, "malformed contact fields replaced with defaults");
            }
            record
        })
        .collect()
}

/// Decode message records one by one, like [`decode_contacts`].
pub(crate) fn decode_messages(items: Vec<Value>) -> Vec<MessageRecord> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let (record, dropped) = MessageRecord::from_value_lenient(item);
            if !dropped.is_empty() {
                warn!(index, fields = ?dropped, "malformed message fields replaced with defaults");
            }
            record
        })
        .collect()
}

/// Extract the handle id from a handle lookup response.
///
/// An empty or missing `data` object means the address is unknown.
fn parse_handle(body: &Value) -> Option<HandleId> {
    let id = body.get("data")?.get("originalROWID")?;
    match id {
        Value::Number(n) => Some(HandleId(n.to_string())),
        Value::String(s) if !s.is_empty() => Some(HandleId(s.clone())),
        _ => None,
    }
}
