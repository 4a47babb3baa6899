//! Address → handle resolution.
//!
//! Addresses already present in the contact's [`HandleMap`] are reused
//! without a network call. Every other address is looked up once; a miss
//! or a transport failure skips only that address. Cancellation is checked
//! before each lookup.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::ingest::CancelToken;
use crate::models::{ContactProfile, HandleId, HandleMap};
use crate::progress::{emit, IngestEvent};
use crate::source::MessageSource;

/// What happened to one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressOutcome {
    Cached(HandleId),
    Resolved(HandleId),
    NotFound,
    Failed(String),
}

/// Result of resolving every address of one contact.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Working handle set, in address order, without duplicates.
    pub handles: Vec<HandleId>,
    /// Cache carried over from prior runs plus everything resolved now.
    pub map: HandleMap,
    pub outcomes: Vec<(String, AddressOutcome)>,
    /// Lookups stopped early on cancellation.
    pub cancelled: bool,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Any address whose lookup ended in a transport error.
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, AddressOutcome::Failed(_)))
    }
}

/// Resolve the profile's addresses to handles.
///
/// `cached` is the map persisted by earlier runs; it is never pruned, only
/// extended.
pub async fn resolve_handles(
    source: &dyn MessageSource,
    profile: &ContactProfile,
    cached: &HandleMap,
    cancel: &CancelToken,
    events: &UnboundedSender<IngestEvent>,
) -> Resolution {
    let mut resolution = Resolution {
        map: cached.clone(),
        ..Default::default()
    };

    for address in profile.addresses() {
        if cancel.is_cancelled() {
            resolution.cancelled = true;
            break;
        }
        let value = address.value.as_str();

        let outcome = match resolution.map.get(value) {
            Some(handle) => AddressOutcome::Cached(handle.clone()),
            None => match source.resolve_handle(value).await {
                Ok(Some(handle)) => AddressOutcome::Resolved(handle),
                Ok(None) => AddressOutcome::NotFound,
                Err(e) => AddressOutcome::Failed(e.to_string()),
            },
        };

        match &outcome {
            AddressOutcome::Cached(handle) => {
                debug!(contact = %profile.id, address = value, %handle, "using cached handle");
                emit(
                    events,
                    IngestEvent::HandleCached {
                        contact_id: profile.id.clone(),
                        address: value.to_string(),
                        handle: handle.to_string(),
                    },
                );
                push_unique(&mut resolution.handles, handle);
            }
            AddressOutcome::Resolved(handle) => {
                info!(contact = %profile.id, address = value, %handle, "found handle");
                emit(
                    events,
                    IngestEvent::HandleResolved {
                        contact_id: profile.id.clone(),
                        address: value.to_string(),
                        handle: handle.to_string(),
                    },
                );
                resolution.map.insert(value.to_string(), handle.clone());
                push_unique(&mut resolution.handles, handle);
            }
            AddressOutcome::NotFound => {
                info!(contact = %profile.id, address = value, "handle not found");
                emit(
                    events,
                    IngestEvent::HandleNotFound {
                        contact_id: profile.id.clone(),
                        address: value.to_string(),
                    },
                );
            }
            AddressOutcome::Failed(error) => {
                warn!(contact = %profile.id, address = value, %error, "handle lookup failed");
                emit(
                    events,
                    IngestEvent::HandleFailed {
                        contact_id: profile.id.clone(),
                        address: value.to_string(),
                        error: error.clone(),
                    },
                );
            }
        }

        resolution.outcomes.push((value.to_string(), outcome));
    }

    resolution
}

fn push_unique(handles: &mut Vec<HandleId>, handle: &HandleId) {
    if !handles.contains(handle) {
        handles.push(handle.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::normalize_contact;
    use crate::ingest::cancel_pair;
    use crate::models::ContactRecord;
    use crate::source::StaticSource;
    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    fn ann() -> ContactProfile {
        normalize_contact(
            &ContactRecord::from_value(json!({
                "firstName": "Ann",
                "emails": [{"address": "ann@x.com"}, {"address": "ann@work.com"}],
                "phoneNumbers": [{"address": "+1 555 0100"}]
            }))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn cached_addresses_skip_lookup_and_duplicates_collapse() {
        let source = StaticSource::new()
            .with_handle("ann@work.com", "7")
            .with_handle("+15550100", "7");
        let mut cached = HandleMap::new();
        cached.insert("ann@x.com".into(), HandleId::from("3"));
        let (tx, _rx) = unbounded_channel();

        let resolution = resolve_handles(&source, &ann(), &cached, &CancelToken::never(), &tx).await;

        assert_eq!(source.lookups(), vec!["ann@work.com", "+15550100"]);
        assert_eq!(resolution.handles, vec![HandleId::from("3"), HandleId::from("7")]);
        assert_eq!(resolution.map.len(), 3);
        assert!(!resolution.cancelled);
    }

    #[tokio::test]
    async fn failed_lookup_skips_only_that_address() {
        let source = StaticSource::new()
            .failing_address("ann@x.com")
            .with_handle("ann@work.com", "7");
        let (tx, _rx) = unbounded_channel();

        let resolution =
            resolve_handles(&source, &ann(), &HandleMap::new(), &CancelToken::never(), &tx).await;

        assert!(resolution.has_failures());
        assert_eq!(resolution.handles, vec![HandleId::from("7")]);
        assert_eq!(resolution.outcomes[2].1, AddressOutcome::NotFound);
    }

    #[tokio::test]
    async fn cancellation_stops_lookups() {
        let source = StaticSource::new().with_handle("ann@x.com", "3");
        let (handle, token) = cancel_pair();
        handle.cancel();
        let (tx, _rx) = unbounded_channel();

        let resolution = resolve_handles(&source, &ann(), &HandleMap::new(), &token, &tx).await;

        assert!(resolution.cancelled);
        assert!(resolution.is_empty());
        assert!(source.lookups().is_empty());
    }
}
