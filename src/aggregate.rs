//! Paginated message aggregation across a contact's handles.
//!
//! Each handle is paged from offset 0 in steps of `page_size` until a
//! short page comes back. A transport error ends that handle's loop only;
//! messages already fetched from it are kept. The pooled messages are then
//! stable-sorted newest first, so equal timestamps keep fetch order.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::ingest::CancelToken;
use crate::models::{ContactProfile, HandleId, Message, MessageRecord};
use crate::progress::{emit, IngestEvent};
use crate::source::MessageSource;

/// Every message reachable through a contact's handles.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Sorted by timestamp, newest first.
    pub messages: Vec<Message>,
    /// `false` when a handle's pagination ended early on an error or on
    /// cancellation.
    pub complete: bool,
}

/// Fetch, pool, and sort all messages for `handles`.
pub async fn aggregate_messages(
    source: &dyn MessageSource,
    profile: &ContactProfile,
    handles: &[HandleId],
    page_size: usize,
    cancel: &CancelToken,
    events: &UnboundedSender<IngestEvent>,
) -> Aggregation {
    let page_size = page_size.max(1);
    let mut messages: Vec<Message> = Vec::new();
    let mut complete = true;

    'handles: for handle in handles {
        let mut offset = 0usize;
        loop {
            if cancel.is_cancelled() {
                complete = false;
                break 'handles;
            }

            let page = match source.fetch_messages(handle, offset, page_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(contact = %profile.id, %handle, offset, error = %e, "message page failed");
                    emit(
                        events,
                        IngestEvent::PageFailed {
                            contact_id: profile.id.clone(),
                            handle: handle.to_string(),
                            offset,
                            error: e.to_string(),
                        },
                    );
                    complete = false;
                    break;
                }
            };

            let fetched = page.len();
            messages.extend(page.into_iter().map(|r| to_message(r, profile)));
            debug!(contact = %profile.id, %handle, offset, fetched, "fetched message page");

            if fetched < page_size {
                break;
            }
            offset += page_size;
        }
    }

    sort_newest_first(&mut messages);
    Aggregation { messages, complete }
}

/// Stable sort by timestamp, descending.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.timestamp_millis.cmp(&a.timestamp_millis));
}

/// Label the sender with the contact's display name, falling back to the
/// address the source attached to the message.
fn to_message(record: MessageRecord, profile: &ContactProfile) -> Message {
    let sender = if !profile.display_name.is_empty() {
        profile.display_name.clone()
    } else {
        record
            .handle
            .as_ref()
            .and_then(|h| h.address.clone())
            .unwrap_or_default()
    };
    Message {
        sender,
        text: record.text.unwrap_or_default(),
        timestamp_millis: record.date_created.unwrap_or_default(),
        is_from_me: record.is_from_me.unwrap_or_default(),
        raw: record.raw,
    }
}
