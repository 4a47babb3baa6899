//! Idempotent persistence of one contact's ingestion result.
//!
//! Writes happen in a fixed order with no transaction around them:
//!
//! 1. the profile (full overwrite),
//! 2. every blob (full overwrite, keyed by blob id),
//! 3. the handle map (partial update).
//!
//! A failure part-way leaves earlier writes in place; the store stays
//! queryable and the next run rewrites everything.

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::{ContactProfile, HandleMap, MessageBlob};
use crate::store::Store;

/// Counts of what [`write_contact`] persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub blobs_written: usize,
}

/// Persist a profile, its blobs, and its handle map.
pub async fn write_contact(
    store: &dyn Store,
    profile: &ContactProfile,
    blobs: &[MessageBlob],
    handles: &HandleMap,
) -> Result<SyncOutcome> {
    store
        .upsert_contact(profile)
        .await
        .with_context(|| format!("Failed to store contact {}", profile.id))?;

    for blob in blobs {
        store
            .upsert_blob(blob)
            .await
            .with_context(|| format!("Failed to store blob {}", blob.id()))?;
    }

    store
        .update_handles(&profile.id, handles)
        .await
        .with_context(|| format!("Failed to update handles for {}", profile.id))?;

    debug!(contact = %profile.id, blobs = blobs.len(), handles = handles.len(), "contact written");

    Ok(SyncOutcome {
        blobs_written: blobs.len(),
    })
}

/// Delete blobs left over from a longer history, i.e. ordinals `>= keep`.
pub async fn prune_stale_blobs(store: &dyn Store, contact_id: &str, keep: usize) -> Result<u64> {
    let removed = store
        .delete_blobs_from(contact_id, keep as i64)
        .await
        .with_context(|| format!("Failed to prune blobs for {}", contact_id))?;
    if removed > 0 {
        debug!(contact = contact_id, removed, keep, "pruned stale blobs");
    }
    Ok(removed)
}
