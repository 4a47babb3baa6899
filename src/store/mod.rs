//! Storage abstraction for Contact Harness.
//!
//! The [`Store`] trait is the document store seen by the sync writer and
//! the retrieval resolver. Contacts and blobs are addressed by their
//! deterministic ids, so every write is an idempotent upsert.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{ContactProfile, HandleMap, MessageBlob};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Row counts for `chx stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub contacts: i64,
    pub contacts_with_handles: i64,
    pub blobs: i64,
}

/// Abstract document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_contact`](Store::upsert_contact) | Full overwrite of a profile, clearing its handle map |
/// | [`update_handles`](Store::update_handles) | Partial update of the handle map only |
/// | [`upsert_blob`](Store::upsert_blob) | Full overwrite of one blob |
/// | [`get_contact`](Store::get_contact) | Profile by id, addresses annotated with cached handles |
/// | [`get_handles`](Store::get_handles) | Persisted handle map (empty when unknown) |
/// | [`search_contacts`](Store::search_contacts) | Prefix search over names, emails and phones |
/// | [`list_blobs`](Store::list_blobs) | A contact's blobs, ascending ordinal |
/// | [`delete_blobs_from`](Store::delete_blobs_from) | Drop blobs with ordinal ≥ n |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace the whole profile document.
    ///
    /// This is an overwrite, not a merge: the stored handle map is reset
    /// and must be written again with [`update_handles`](Store::update_handles).
    async fn upsert_contact(&self, profile: &ContactProfile) -> Result<()>;

    /// Replace the handle map of an existing contact without touching the
    /// rest of its document.
    async fn update_handles(&self, contact_id: &str, handles: &HandleMap) -> Result<()>;

    /// Insert or replace one blob, keyed by its id.
    async fn upsert_blob(&self, blob: &MessageBlob) -> Result<()>;

    async fn get_contact(&self, id: &str) -> Result<Option<ContactProfile>>;

    async fn get_handles(&self, contact_id: &str) -> Result<HandleMap>;

    /// Candidate contacts whose names, emails or phones start with the
    /// query terms. Ranking is backend-defined.
    async fn search_contacts(&self, query: &str, limit: i64) -> Result<Vec<ContactProfile>>;

    async fn list_blobs(&self, contact_id: &str) -> Result<Vec<MessageBlob>>;

    /// Delete the contact's blobs with `ordinal >= from_ordinal`.
    /// Returns the number of blobs removed.
    async fn delete_blobs_from(&self, contact_id: &str, from_ordinal: i64) -> Result<u64>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Remove every contact and blob.
    async fn reset(&self) -> Result<()>;
}

/// Split a free-text query into lowercase alphanumeric search terms.
///
/// `"Ann@X.com"` becomes `["ann", "x", "com"]`.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_terms_split_on_punctuation() {
        assert_eq!(query_terms("Ann@X.com"), vec!["ann", "x", "com"]);
        assert_eq!(query_terms("+1 (555) 123"), vec!["1", "555", "123"]);
        assert!(query_terms("  @@ ").is_empty());
    }
}
