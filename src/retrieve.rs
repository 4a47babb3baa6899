//! Search-time contact resolution and transcript reassembly.
//!
//! A free-text query goes through the store's prefix search to get
//! candidates, then only a candidate with an email or phone *exactly*
//! equal to the query (ignoring case) is accepted. Email and phone queries
//! are normalized like stored addresses first, so `+1 555 0100` finds
//! `+15550100`. There is no fallback to the closest fuzzy match.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::RetrievalError;
use crate::identity::normalize_query;
use crate::models::{ContactProfile, ContactSummary, MessageBlob};
use crate::store::{SqliteStore, Store};

/// Queries shorter than this return no suggestions.
pub const MIN_SUGGEST_CHARS: usize = 3;

/// A resolved contact with its blobs in ascending ordinal order.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub contact: ContactProfile,
    pub blobs: Vec<MessageBlob>,
}

impl Transcript {
    /// Blobs concatenated for display or export, each followed by a blank line.
    pub fn render(&self) -> String {
        render_blobs(&self.blobs)
    }
}

/// Resolve `query` to exactly one contact.
///
/// # Errors
///
/// [`RetrievalError::NotFound`] when no candidate has an exactly matching
/// address; store errors otherwise.
pub async fn resolve_contact(
    store: &dyn Store,
    query: &str,
    candidate_limit: i64,
) -> Result<ContactProfile> {
    let needle = normalize_query(query);
    let candidates = store.search_contacts(&needle, candidate_limit).await?;
    debug!(query, needle = %needle, candidates = candidates.len(), "contact candidates");

    candidates
        .into_iter()
        .find(|c| c.has_exact_address(&needle))
        .ok_or_else(|| RetrievalError::NotFound(query.trim().to_string()).into())
}

/// All blobs of a contact, ascending ordinal.
pub async fn fetch_transcript(store: &dyn Store, contact_id: &str) -> Result<Vec<MessageBlob>> {
    let mut blobs = store.list_blobs(contact_id).await?;
    blobs.sort_by_key(|b| b.ordinal);
    Ok(blobs)
}

/// Resolve `query` and load the contact's transcript.
pub async fn retrieve(store: &dyn Store, query: &str, candidate_limit: i64) -> Result<Transcript> {
    let contact = resolve_contact(store, query, candidate_limit).await?;
    let blobs = fetch_transcript(store, &contact.id).await?;
    info!(contact = %contact.id, blobs = blobs.len(), "transcript loaded");
    Ok(Transcript { contact, blobs })
}

/// Type-ahead suggestions: contacts with a display name matching the query
/// prefix.
pub async fn suggest_contacts(
    store: &dyn Store,
    query: &str,
    limit: i64,
) -> Result<Vec<ContactSummary>> {
    if query.trim().chars().count() < MIN_SUGGEST_CHARS {
        return Ok(Vec::new());
    }
    Ok(store
        .search_contacts(query, limit)
        .await?
        .into_iter()
        .filter(|c| !c.display_name.is_empty())
        .map(|c| ContactSummary {
            id: c.id,
            display_name: c.display_name,
        })
        .collect())
}

pub fn render_blobs(blobs: &[MessageBlob]) -> String {
    let mut out = String::new();
    for blob in blobs {
        out.push_str(&blob.text);
        out.push_str("\n\n");
    }
    out
}

/// `"{display name}_messages.txt"` in the current directory.
pub fn default_export_path(contact: &ContactProfile) -> PathBuf {
    let stem: String = contact
        .display_name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() {
        contact.id.clone()
    } else {
        stem
    };
    PathBuf::from(format!("{}_messages.txt", stem))
}

/// Write the transcript as UTF-8 text.
pub fn export_transcript(path: &Path, transcript: &Transcript) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, transcript.render())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// `chx search`: list contacts matching the query prefix.
pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    let store = SqliteStore::open(&config.db).await?;
    let hits = suggest_contacts(&store, query, config.retrieval.candidate_limit).await?;
    store.close().await;

    if hits.is_empty() {
        println!("No matching contacts.");
        return Ok(());
    }
    for hit in &hits {
        println!("{}  {}", hit.id, hit.display_name);
    }
    Ok(())
}

/// `chx get`: print the transcript of the contact owning the address.
pub async fn run_get(config: &Config, query: &str) -> Result<()> {
    let store = SqliteStore::open(&config.db).await?;
    let result = retrieve(&store, query, config.retrieval.candidate_limit).await;
    store.close().await;
    let transcript = result?;

    println!("--- {} ({}) ---", transcript.contact.display_name, transcript.contact.id);
    println!("blobs: {}", transcript.blobs.len());
    println!();
    print!("{}", transcript.render());
    Ok(())
}

/// `chx export`: write the transcript to `output`, or to
/// [`default_export_path`] when none is given.
pub async fn run_export(config: &Config, query: &str, output: Option<PathBuf>) -> Result<()> {
    let store = SqliteStore::open(&config.db).await?;
    let result = retrieve(&store, query, config.retrieval.candidate_limit).await;
    store.close().await;
    let transcript = result?;

    let path = output.unwrap_or_else(|| default_export_path(&transcript.contact));
    export_transcript(&path, &transcript)?;
    println!(
        "Exported {} blobs for {} to {}",
        transcript.blobs.len(),
        transcript.contact.display_name,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::normalize_contact;
    use crate::models::ContactRecord;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn contact(value: serde_json::Value) -> ContactProfile {
        normalize_contact(&ContactRecord::from_value(value).unwrap())
    }

    #[tokio::test]
    async fn exact_email_disambiguates_same_display_name() {
        let store = InMemoryStore::new();
        let a = contact(json!({"displayName": "Ann Lee", "emails": [{"address": "ann@x.com"}]}));
        let b = contact(json!({"displayName": "Ann Lee", "emails": [{"address": "ann@xy.com"}]}));
        store.upsert_contact(&b).await.unwrap();
        store.upsert_contact(&a).await.unwrap();

        let found = resolve_contact(&store, "ANN@x.com", 50).await.unwrap();
        assert_eq!(found.id, a.id);
        let found = resolve_contact(&store, "ann@xy.com", 50).await.unwrap();
        assert_eq!(found.id, b.id);
    }

    #[tokio::test]
    async fn prefix_only_match_is_not_found() {
        let store = InMemoryStore::new();
        let a = contact(json!({"displayName": "Ann Lee", "emails": [{"address": "ann@x.com"}]}));
        store.upsert_contact(&a).await.unwrap();

        let err = resolve_contact(&store, "ann", 50).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RetrievalError>(),
            Some(RetrievalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn phone_query_matches_normalized_phone() {
        let store = InMemoryStore::new();
        let a = contact(json!({"firstName": "Bo", "phoneNumbers": [{"address": "+1 (555) 010-9999"}]}));
        store.upsert_contact(&a).await.unwrap();
        let found = resolve_contact(&store, "+15550109999", 50).await.unwrap();
        assert_eq!(found.id, a.id);
    }

    #[tokio::test]
    async fn formatted_phone_query_matches() {
        let store = InMemoryStore::new();
        let a = contact(json!({"firstName": "Ann", "phoneNumbers": [{"address": "+1 555 0100"}]}));
        store.upsert_contact(&a).await.unwrap();

        assert_eq!(resolve_contact(&store, "+1 555 0100", 50).await.unwrap().id, a.id);
        assert_eq!(resolve_contact(&store, "+1 (555) 01-00", 50).await.unwrap().id, a.id);
        assert!(resolve_contact(&store, "+1 555", 50).await.is_err());
    }

    #[tokio::test]
    async fn suggestions_need_three_chars() {
        let store = InMemoryStore::new();
        store
            .upsert_contact(&contact(json!({"displayName": "Annabel"})))
            .await
            .unwrap();
        assert!(suggest_contacts(&store, "an", 10).await.unwrap().is_empty());
        let hits = suggest_contacts(&store, "ann", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name, "Annabel");
    }

    #[test]
    fn render_separates_blobs_with_blank_line() {
        let blobs = vec![
            MessageBlob {
                contact_id: "c".into(),
                ordinal: 0,
                text: "From: me\nText: b\n".into(),
            },
            MessageBlob {
                contact_id: "c".into(),
                ordinal: 1,
                text: "From: me\nText: a\n".into(),
            },
        ];
        assert_eq!(
            render_blobs(&blobs),
            "From: me\nText: b\n\n\nFrom: me\nText: a\n\n\n"
        );
    }

    #[test]
    fn export_writes_rendered_transcript() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out").join("ann.txt");
        let transcript = Transcript {
            contact: contact(json!({"displayName": "Ann"})),
            blobs: vec![MessageBlob {
                contact_id: "c".into(),
                ordinal: 0,
                text: "From: Ann\nText: hi\n".into(),
            }],
        };
        export_transcript(&path, &transcript).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "From: Ann\nText: hi\n\n\n"
        );
    }

    #[test]
    fn default_export_path_sanitizes_name() {
        let c = contact(json!({"displayName": "Ann / Lee"}));
        assert_eq!(default_export_path(&c), PathBuf::from("Ann___Lee_messages.txt"));
    }
}
