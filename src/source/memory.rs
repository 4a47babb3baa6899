//! In-memory [`MessageSource`] for tests and offline demos.
//!
//! Contacts, handles and message pages are scripted up front as JSON and
//! decoded the same way server payloads are. Individual
//! addresses and pages can be made to fail with a transport error, and
//! every lookup is recorded so callers can assert which requests were made.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::SourceError;
use crate::models::{ContactRecord, HandleId, MessageRecord};

use super::{decode_contacts, decode_messages, MessageSource};

/// Scripted messaging source.
#[derive(Default)]
pub struct StaticSource {
    contacts: Vec<serde_json::Value>,
    handles: HashMap<String, HandleId>,
    messages: HashMap<HandleId, Vec<serde_json::Value>>,
    failing_addresses: HashSet<String>,
    failing_pages: HashSet<(HandleId, usize)>,
    unreachable: bool,
    lookups: Mutex<Vec<String>>,
    page_requests: Mutex<Vec<(HandleId, usize)>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contact(mut self, contact: serde_json::Value) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Bind `address` (normalized form) to `handle`.
    pub fn with_handle(mut self, address: &str, handle: &str) -> Self {
        self.handles
            .insert(address.to_string(), HandleId::from(handle));
        self
    }

    /// Append a message for `handle`. Messages are served in insertion order.
    pub fn with_message(mut self, handle: &str, text: &str, date_created: i64, is_from_me: bool) -> Self {
        self.messages
            .entry(HandleId::from(handle))
            .or_default()
            .push(json!({
                "text": text,
                "dateCreated": date_created,
                "isFromMe": is_from_me,
            }));
        self
    }

    /// Append an arbitrary message payload for `handle`.
    pub fn with_raw_message(mut self, handle: &str, message: serde_json::Value) -> Self {
        self.messages
            .entry(HandleId::from(handle))
            .or_default()
            .push(message);
        self
    }

    /// Lookups of `address` fail with a transport error.
    pub fn failing_address(mut self, address: &str) -> Self {
        self.failing_addresses.insert(address.to_string());
        self
    }

    /// The page of `handle` starting at `offset` fails with a transport error.
    pub fn failing_page(mut self, handle: &str, offset: usize) -> Self {
        self.failing_pages.insert((HandleId::from(handle), offset));
        self
    }

    /// `ping` and `list_contacts` fail.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Addresses passed to `resolve_handle`, in call order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// `(handle, offset)` pairs passed to `fetch_messages`, in call order.
    pub fn page_requests(&self) -> Vec<(HandleId, usize)> {
        self.page_requests
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageSource for StaticSource {
    async fn ping(&self) -> Result<(), SourceError> {
        if self.unreachable {
            return Err(SourceError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, SourceError> {
        self.ping().await?;
        Ok(decode_contacts(self.contacts.clone()))
    }

    async fn resolve_handle(&self, address: &str) -> Result<Option<HandleId>, SourceError> {
        if let Ok(mut lookups) = self.lookups.lock() {
            lookups.push(address.to_string());
        }
        if self.failing_addresses.contains(address) {
            return Err(SourceError::Transport(format!("lookup of {} timed out", address)));
        }
        Ok(self.handles.get(address).cloned())
    }

    async fn fetch_messages(
        &self,
        handle: &HandleId,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<MessageRecord>, SourceError> {
        if let Ok(mut requests) = self.page_requests.lock() {
            requests.push((handle.clone(), offset));
        }
        if self.failing_pages.contains(&(handle.clone(), offset)) {
            return Err(SourceError::Transport(format!(
                "page {} of handle {} reset",
                offset, handle
            )));
        }
        let page: Vec<serde_json::Value> = self
            .messages
            .get(handle)
            .map(|all| all.iter().skip(offset).take(page_size).cloned().collect())
            .unwrap_or_default();
        Ok(decode_messages(page))
    }
}
