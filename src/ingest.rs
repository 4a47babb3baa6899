//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow for every contact the source knows about:
//! identity normalization → handle resolution → message aggregation →
//! chunking → storage. Contacts are processed one at a time; a failure
//! inside one contact is reported and the run moves on. Only an
//! unreachable source or an unusable store aborts the run.
//!
//! [`spawn_ingest`] runs the pipeline as a background task and hands back
//! an event receiver plus a [`CancelHandle`]. Cancellation is observed
//! between contacts and between message pages.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregate::{aggregate_messages, Aggregation};
use crate::chunk::chunk_messages;
use crate::config::{Config, IngestConfig};
use crate::embedding::{create_provider, vector_or_placeholder, EmbeddingProvider};
use crate::identity::normalize_contact;
use crate::models::ContactProfile;
use crate::progress::{emit, IngestEvent, ProgressMode};
use crate::resolve::resolve_handles;
use crate::source::{BlueBubblesSource, MessageSource};
use crate::store::{SqliteStore, Store};
use crate::sync::{prune_stale_blobs, write_contact};

/// Requests cancellation of a running ingestion.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the pipeline at its cancellation points.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

/// Totals for one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub contacts_seen: usize,
    pub contacts_stored: usize,
    pub contacts_skipped: usize,
    pub contacts_failed: usize,
    pub messages: usize,
    pub blobs: usize,
    pub cancelled: bool,
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub page_size: usize,
    pub blob_size: usize,
    /// Process at most this many contacts.
    pub contact_limit: Option<usize>,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            page_size: config.page_size,
            blob_size: config.blob_size,
            contact_limit: (config.contact_limit > 0).then_some(config.contact_limit),
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

enum ContactOutcome {
    Stored { messages: usize, blobs: usize },
    Cancelled,
}

/// Ingest every contact from `source` into `store`.
///
/// # Errors
///
/// Fails only when the source cannot be reached or its contact list cannot
/// be read. Per-contact failures are counted in the summary and reported
/// as [`IngestEvent::ContactFailed`].
pub async fn run_ingest(
    source: &dyn MessageSource,
    store: &dyn Store,
    embedder: &dyn EmbeddingProvider,
    opts: &IngestOptions,
    cancel: &CancelToken,
    events: &UnboundedSender<IngestEvent>,
) -> Result<RunSummary> {
    source
        .ping()
        .await
        .context("Messaging source is unreachable")?;
    let mut records = source
        .list_contacts()
        .await
        .context("Failed to list contacts")?;
    if let Some(limit) = opts.contact_limit {
        records.truncate(limit);
    }

    let total = records.len();
    info!(contacts = total, "ingestion started");
    emit(events, IngestEvent::RunStarted { contacts: total });

    let mut summary = RunSummary::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, record) in records.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let profile = normalize_contact(record);
        summary.contacts_seen += 1;
        emit(
            events,
            IngestEvent::ContactStarted {
                n: i + 1,
                total,
                contact_id: profile.id.clone(),
                display_name: profile.display_name.clone(),
            },
        );

        if !seen.insert(profile.id.clone()) {
            warn!(contact = %profile.id, "identity collision; skipping contact");
            summary.contacts_skipped += 1;
            emit(
                events,
                IngestEvent::ContactSkipped {
                    contact_id: profile.id.clone(),
                    reason: "same identity as an earlier contact in this run".to_string(),
                },
            );
            continue;
        }

        let contact_id = profile.id.clone();
        match ingest_contact(source, store, embedder, opts, cancel, events, profile).await {
            Ok(ContactOutcome::Stored { messages, blobs }) => {
                summary.contacts_stored += 1;
                summary.messages += messages;
                summary.blobs += blobs;
            }
            Ok(ContactOutcome::Cancelled) => {
                summary.cancelled = true;
                break;
            }
            Err(e) => {
                warn!(contact = %contact_id, error = %format!("{:#}", e), "contact failed");
                summary.contacts_failed += 1;
                emit(
                    events,
                    IngestEvent::ContactFailed {
                        contact_id,
                        error: format!("{:#}", e),
                    },
                );
            }
        }
    }

    if summary.cancelled {
        info!(processed = summary.contacts_stored, "ingestion cancelled");
        emit(
            events,
            IngestEvent::Cancelled {
                processed: summary.contacts_stored,
            },
        );
    }

    info!(
        stored = summary.contacts_stored,
        messages = summary.messages,
        blobs = summary.blobs,
        skipped = summary.contacts_skipped,
        failed = summary.contacts_failed,
        "ingestion finished"
    );
    emit(
        events,
        IngestEvent::RunFinished {
            summary: summary.clone(),
        },
    );
    Ok(summary)
}

/// Resolve, aggregate, chunk, and persist one contact.
///
/// A contact interrupted by cancellation mid-aggregation is not written,
/// so its previously stored blobs stay as they were.
async fn ingest_contact(
    source: &dyn MessageSource,
    store: &dyn Store,
    embedder: &dyn EmbeddingProvider,
    opts: &IngestOptions,
    cancel: &CancelToken,
    events: &UnboundedSender<IngestEvent>,
    mut profile: ContactProfile,
) -> Result<ContactOutcome> {
    // Read before the upsert: the profile overwrite resets the map.
    let cached = store
        .get_handles(&profile.id)
        .await
        .with_context(|| format!("Failed to read cached handles for {}", profile.id))?;

    let resolution = resolve_handles(source, &profile, &cached, cancel, events).await;
    if resolution.cancelled {
        return Ok(ContactOutcome::Cancelled);
    }
    profile.annotate_handles(&resolution.map);
    profile.semantic_vector = vector_or_placeholder(embedder, &profile.embedding_text()).await;

    let aggregation = if resolution.is_empty() {
        emit(
            events,
            IngestEvent::NoHandles {
                contact_id: profile.id.clone(),
            },
        );
        Aggregation {
            messages: Vec::new(),
            complete: true,
        }
    } else {
        aggregate_messages(
            source,
            &profile,
            &resolution.handles,
            opts.page_size,
            cancel,
            events,
        )
        .await
    };

    if !aggregation.complete && cancel.is_cancelled() {
        return Ok(ContactOutcome::Cancelled);
    }

    let blobs = chunk_messages(&profile.id, &aggregation.messages, opts.blob_size);
    let written = write_contact(store, &profile, &blobs, &resolution.map).await?;

    // Blobs beyond the new count are only known to be stale when every
    // address and every page was read.
    let pruned = if aggregation.complete && !resolution.has_failures() {
        prune_stale_blobs(store, &profile.id, blobs.len()).await?
    } else {
        0
    };

    emit(
        events,
        IngestEvent::ContactStored {
            contact_id: profile.id.clone(),
            messages: aggregation.messages.len(),
            blobs: written.blobs_written,
            pruned,
        },
    );

    Ok(ContactOutcome::Stored {
        messages: aggregation.messages.len(),
        blobs: written.blobs_written,
    })
}

/// A background ingestion run.
pub struct IngestHandle {
    /// Ordered progress events. Closed when the run ends.
    pub events: UnboundedReceiver<IngestEvent>,
    pub cancel: CancelHandle,
    pub join: JoinHandle<Result<RunSummary>>,
}

/// Run [`run_ingest`] on a tokio task.
pub fn spawn_ingest(
    source: Arc<dyn MessageSource>,
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    opts: IngestOptions,
) -> IngestHandle {
    let (tx, rx) = unbounded_channel();
    let (cancel, token) = cancel_pair();
    let join = tokio::spawn(async move {
        run_ingest(
            source.as_ref(),
            store.as_ref(),
            embedder.as_ref(),
            &opts,
            &token,
            &tx,
        )
        .await
    });
    IngestHandle {
        events: rx,
        cancel,
        join,
    }
}

/// `chx ingest`: run against the configured BlueBubbles server and SQLite
/// database, rendering progress until the run ends. Ctrl-C cancels after
/// the current page.
pub async fn run_ingest_command(
    config: &Config,
    limit: Option<usize>,
    mode: ProgressMode,
) -> Result<RunSummary> {
    let source = Arc::new(BlueBubblesSource::new(&config.source)?);
    let store = Arc::new(SqliteStore::open(&config.db).await?);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);

    let mut opts = IngestOptions::from_config(&config.ingest);
    if limit.is_some() {
        opts.contact_limit = limit;
    }

    let mut handle = spawn_ingest(source, store.clone(), embedder, opts);
    let reporter = mode.reporter();
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(event) => reporter.report(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("interrupt received; stopping ingestion");
                interrupted = true;
                handle.cancel.cancel();
            }
        }
    }

    let summary = handle.join.await.context("Ingestion task panicked")??;
    store.close().await;

    println!("ingest");
    println!("  contacts stored: {}", summary.contacts_stored);
    println!("  messages: {}", summary.messages);
    println!("  blobs written: {}", summary.blobs);
    println!("  skipped: {}", summary.contacts_skipped);
    println!("  failed: {}", summary.contacts_failed);
    println!("{}", if summary.cancelled { "cancelled" } else { "ok" });

    Ok(summary)
}
