//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec` and `BTreeMap` behind `std::sync::RwLock`. Contacts keep
//! insertion order, which is also the search ranking.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{ContactProfile, HandleMap, MessageBlob};

use super::{query_terms, Store, StoreStats};

struct StoredContact {
    profile: ContactProfile,
    handles: HandleMap,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    contacts: RwLock<Vec<StoredContact>>,
    blobs: RwLock<BTreeMap<(String, i64), MessageBlob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("store lock poisoned"))
}

fn searchable_tokens(profile: &ContactProfile) -> Vec<String> {
    let mut tokens = Vec::new();
    for field in [
        &profile.display_name,
        &profile.first_name,
        &profile.last_name,
    ] {
        tokens.extend(query_terms(field));
    }
    for address in profile.addresses() {
        tokens.extend(query_terms(&address.value));
    }
    tokens
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_contact(&self, profile: &ContactProfile) -> Result<()> {
        let mut contacts = write(&self.contacts)?;
        let stored = StoredContact {
            profile: profile.clone(),
            handles: HandleMap::new(),
        };
        match contacts.iter_mut().find(|c| c.profile.id == profile.id) {
            Some(existing) => *existing = stored,
            None => contacts.push(stored),
        }
        Ok(())
    }

    async fn update_handles(&self, contact_id: &str, handles: &HandleMap) -> Result<()> {
        let mut contacts = write(&self.contacts)?;
        match contacts.iter_mut().find(|c| c.profile.id == contact_id) {
            Some(existing) => {
                existing.handles = handles.clone();
                Ok(())
            }
            None => bail!("contact not found: {}", contact_id),
        }
    }

    async fn upsert_blob(&self, blob: &MessageBlob) -> Result<()> {
        write(&self.blobs)?.insert((blob.contact_id.clone(), blob.ordinal), blob.clone());
        Ok(())
    }

    async fn get_contact(&self, id: &str) -> Result<Option<ContactProfile>> {
        let contacts = read(&self.contacts)?;
        Ok(contacts.iter().find(|c| c.profile.id == id).map(|c| {
            let mut profile = c.profile.clone();
            profile.annotate_handles(&c.handles);
            profile
        }))
    }

    async fn get_handles(&self, contact_id: &str) -> Result<HandleMap> {
        let contacts = read(&self.contacts)?;
        Ok(contacts
            .iter()
            .find(|c| c.profile.id == contact_id)
            .map(|c| c.handles.clone())
            .unwrap_or_default())
    }

    async fn search_contacts(&self, query: &str, limit: i64) -> Result<Vec<ContactProfile>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let contacts = read(&self.contacts)?;
        Ok(contacts
            .iter()
            .filter(|c| {
                let tokens = searchable_tokens(&c.profile);
                terms
                    .iter()
                    .all(|term| tokens.iter().any(|t| t.starts_with(term.as_str())))
            })
            .take(limit.max(0) as usize)
            .map(|c| {
                let mut profile = c.profile.clone();
                profile.annotate_handles(&c.handles);
                profile
            })
            .collect())
    }

    async fn list_blobs(&self, contact_id: &str) -> Result<Vec<MessageBlob>> {
        let blobs = read(&self.blobs)?;
        Ok(blobs
            .range((contact_id.to_string(), i64::MIN)..=(contact_id.to_string(), i64::MAX))
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn delete_blobs_from(&self, contact_id: &str, from_ordinal: i64) -> Result<u64> {
        let mut blobs = write(&self.blobs)?;
        let before = blobs.len();
        blobs.retain(|(cid, ordinal), _| cid != contact_id || *ordinal < from_ordinal);
        Ok((before - blobs.len()) as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let contacts = read(&self.contacts)?;
        let blobs = read(&self.blobs)?;
        Ok(StoreStats {
            contacts: contacts.len() as i64,
            contacts_with_handles: contacts.iter().filter(|c| !c.handles.is_empty()).count()
                as i64,
            blobs: blobs.len() as i64,
        })
    }

    async fn reset(&self) -> Result<()> {
        write(&self.contacts)?.clear();
        write(&self.blobs)?.clear();
        Ok(())
    }
}
