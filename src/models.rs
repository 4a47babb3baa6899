//! Core data models used throughout Contact Harness.
//!
//! Two families of types live here: the *records* decoded from the
//! messaging source (loosely shaped, every field optional) and the
//! normalized types that flow through the ingestion and retrieval
//! pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Dimensionality of the semantic vector carried by every profile.
pub const EMBEDDING_DIMS: usize = 1536;

// ═══════════════════════════════════════════════════════════════════════
// Source records
// ═══════════════════════════════════════════════════════════════════════

/// Contact record as returned by the messaging source.
///
/// Only the fields the pipeline consumes are decoded. The complete JSON
/// object is kept in `raw` and stored alongside the profile untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub emails: Option<Vec<RecordAddress>>,
    pub phone_numbers: Option<Vec<RecordAddress>>,
    pub addresses: Option<Vec<RecordPostalAddress>>,
    pub social_profiles: Option<Vec<RecordSocialProfile>>,
    pub urls: Option<Vec<RecordUrl>>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl ContactRecord {
    /// Decode a record from a JSON value, keeping the value as the raw payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut record: ContactRecord = serde_json::from_value(value.clone())?;
        record.raw = value;
        Ok(record)
    }

    /// Decode a record, substituting defaults for malformed fields.
    ///
    /// Returns the record and the names of the fields that were dropped.
    pub fn from_value_lenient(value: serde_json::Value) -> (Self, Vec<String>) {
        let (mut record, dropped): (ContactRecord, _) = decode_lenient(&value);
        record.raw = value;
        (record, dropped)
    }

    /// Raw (un-normalized) email strings, in record order.
    pub fn raw_emails(&self) -> Vec<String> {
        raw_addresses(self.emails.as_deref())
    }

    /// Raw (un-normalized) phone strings, in record order.
    pub fn raw_phone_numbers(&self) -> Vec<String> {
        raw_addresses(self.phone_numbers.as_deref())
    }
}

fn raw_addresses(list: Option<&[RecordAddress]>) -> Vec<String> {
    list.unwrap_or_default()
        .iter()
        .filter_map(|a| a.address.clone())
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordAddress {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPostalAddress {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordSocialProfile {
    pub platform: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordUrl {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

/// Message record as returned by a paginated message query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub text: Option<String>,
    pub date_created: Option<i64>,
    pub is_from_me: Option<bool>,
    pub handle: Option<RecordHandle>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl MessageRecord {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut record: MessageRecord = serde_json::from_value(value.clone())?;
        record.raw = value;
        Ok(record)
    }

    /// See [`ContactRecord::from_value_lenient`].
    pub fn from_value_lenient(value: serde_json::Value) -> (Self, Vec<String>) {
        let (mut record, dropped): (MessageRecord, _) = decode_lenient(&value);
        record.raw = value;
        (record, dropped)
    }
}

/// Decode `value` as a whole, or failing that one top-level field at a
/// time, keeping the fields that decode on their own.
fn decode_lenient<T: DeserializeOwned + Default>(value: &serde_json::Value) -> (T, Vec<String>) {
    if let Ok(record) = serde_json::from_value::<T>(value.clone()) {
        return (record, Vec::new());
    }
    let serde_json::Value::Object(map) = value else {
        return (T::default(), vec!["<record>".to_string()]);
    };

    let mut kept = serde_json::Map::new();
    let mut dropped = Vec::new();
    for (key, field) in map {
        let mut single = serde_json::Map::new();
        single.insert(key.clone(), field.clone());
        if serde_json::from_value::<T>(serde_json::Value::Object(single)).is_ok() {
            kept.insert(key.clone(), field.clone());
        } else {
            dropped.push(key.clone());
        }
    }
    let record = serde_json::from_value(serde_json::Value::Object(kept)).unwrap_or_default();
    (record, dropped)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordHandle {
    pub address: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Normalized types
// ═══════════════════════════════════════════════════════════════════════

/// Opaque handle identifier issued by the messaging source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub String);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandleId {
    fn from(s: &str) -> Self {
        HandleId(s.to_string())
    }
}

/// Persisted `address value → handle` cache for one contact.
///
/// A `BTreeMap` so the serialized form is stable across runs.
pub type HandleMap = BTreeMap<String, HandleId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Email,
    Phone,
}

/// A normalized email address or phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    pub value: String,
    /// Handle cached from a prior run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<HandleId>,
}

impl Address {
    pub fn new(kind: AddressKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            handle: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Normalized representation of a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub company: String,
    pub title: String,
    pub emails: Vec<Address>,
    pub phone_numbers: Vec<Address>,
    pub postal_addresses: Vec<PostalAddress>,
    pub social_profiles: Vec<SocialProfile>,
    pub urls: Vec<UrlEntry>,
    pub notes: String,
    pub semantic_vector: Vec<f32>,
    /// Untouched source payload.
    pub raw: serde_json::Value,
}

impl ContactProfile {
    /// Emails followed by phone numbers, in profile order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.emails.iter().chain(self.phone_numbers.iter())
    }

    /// Whether any email or phone equals `query`, ignoring case.
    pub fn has_exact_address(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        !needle.is_empty() && self.addresses().any(|a| a.value.to_lowercase() == needle)
    }

    /// Copy cached handles onto the matching addresses.
    pub fn annotate_handles(&mut self, map: &HandleMap) {
        for addr in self.emails.iter_mut().chain(self.phone_numbers.iter_mut()) {
            addr.handle = map.get(&addr.value).cloned();
        }
    }

    /// Text used to derive the semantic vector.
    pub fn embedding_text(&self) -> String {
        [
            self.display_name.as_str(),
            self.company.as_str(),
            self.title.as_str(),
            self.notes.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// A single message, sender already resolved to a display label.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: String,
    pub text: String,
    pub timestamp_millis: i64,
    pub is_from_me: bool,
    pub raw: serde_json::Value,
}

/// A stored chunk of formatted messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBlob {
    pub contact_id: String,
    pub ordinal: i64,
    pub text: String,
}

impl MessageBlob {
    pub fn id(&self) -> String {
        crate::chunk::blob_id(&self.contact_id, self.ordinal)
    }
}

/// Lightweight contact row for search suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactSummary {
    pub id: String,
    pub display_name: String,
}
