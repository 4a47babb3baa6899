//! Ingestion progress events and their renderers.
//!
//! The ingestion task emits an ordered, append-only stream of
//! [`IngestEvent`]s over a channel. The caller drains it and hands each
//! event to a [`ProgressReporter`]. Reporters write to **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::ingest::RunSummary;

/// A single progress notification from the ingestion task.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    RunStarted {
        contacts: usize,
    },
    ContactStarted {
        n: usize,
        total: usize,
        contact_id: String,
        display_name: String,
    },
    HandleCached {
        contact_id: String,
        address: String,
        handle: String,
    },
    HandleResolved {
        contact_id: String,
        address: String,
        handle: String,
    },
    HandleNotFound {
        contact_id: String,
        address: String,
    },
    HandleFailed {
        contact_id: String,
        address: String,
        error: String,
    },
    NoHandles {
        contact_id: String,
    },
    PageFailed {
        contact_id: String,
        handle: String,
        offset: usize,
        error: String,
    },
    ContactStored {
        contact_id: String,
        messages: usize,
        blobs: usize,
        pruned: u64,
    },
    ContactSkipped {
        contact_id: String,
        reason: String,
    },
    ContactFailed {
        contact_id: String,
        error: String,
    },
    Cancelled {
        processed: usize,
    },
    RunFinished {
        summary: RunSummary,
    },
}

impl IngestEvent {
    /// One human-readable line, without a trailing newline.
    pub fn describe(&self) -> String {
        match self {
            IngestEvent::RunStarted { contacts } => {
                format!("Identified {} contacts.", format_number(*contacts as u64))
            }
            IngestEvent::ContactStarted {
                n,
                total,
                contact_id,
                display_name,
            } => format!(
                "[{}/{}] {} ({})",
                format_number(*n as u64),
                format_number(*total as u64),
                if display_name.is_empty() {
                    "(unnamed)"
                } else {
                    display_name
                },
                short_id(contact_id)
            ),
            IngestEvent::HandleCached {
                address, handle, ..
            } => format!("  cached handle {} for {}", handle, address),
            IngestEvent::HandleResolved {
                address, handle, ..
            } => format!("  found handle {} for {}", handle, address),
            IngestEvent::HandleNotFound { address, .. } => {
                format!("  no handle for {}", address)
            }
            IngestEvent::HandleFailed { address, error, .. } => {
                format!("  handle lookup failed for {}: {}", address, error)
            }
            IngestEvent::NoHandles { contact_id } => {
                format!("  no handles for {}; skipping messages", short_id(contact_id))
            }
            IngestEvent::PageFailed {
                handle,
                offset,
                error,
                ..
            } => format!(
                "  message page at offset {} failed for handle {}: {}",
                offset, handle, error
            ),
            IngestEvent::ContactStored {
                messages,
                blobs,
                pruned,
                ..
            } => {
                let mut line = format!(
                    "  stored {} messages in {} blobs",
                    format_number(*messages as u64),
                    blobs
                );
                if *pruned > 0 {
                    line.push_str(&format!(" ({} stale removed)", pruned));
                }
                line
            }
            IngestEvent::ContactSkipped { contact_id, reason } => {
                format!("  skipped {}: {}", short_id(contact_id), reason)
            }
            IngestEvent::ContactFailed { contact_id, error } => {
                format!("  failed {}: {}", short_id(contact_id), error)
            }
            IngestEvent::Cancelled { processed } => {
                format!("Cancelled after {} contacts.", format_number(*processed as u64))
            }
            IngestEvent::RunFinished { summary } => format!(
                "Done: {} contacts, {} messages, {} blobs ({} skipped, {} failed).",
                format_number(summary.contacts_stored as u64),
                format_number(summary.messages as u64),
                format_number(summary.blobs as u64),
                summary.contacts_skipped,
                summary.contacts_failed
            ),
        }
    }
}

/// Send an event, ignoring a receiver that has gone away.
pub(crate) fn emit(events: &UnboundedSender<IngestEvent>, event: IngestEvent) {
    let _ = events.send(event);
}

/// Renders progress events.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &IngestEvent);
}

/// Human-friendly lines on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &IngestEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", event.describe());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &IngestEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &IngestEvent) {}
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn describe_contact_stored() {
        let event = IngestEvent::ContactStored {
            contact_id: "abc".into(),
            messages: 2500,
            blobs: 3,
            pruned: 1,
        };
        assert_eq!(
            event.describe(),
            "  stored 2,500 messages in 3 blobs (1 stale removed)"
        );
    }

    #[test]
    fn json_events_are_tagged() {
        let event = IngestEvent::HandleNotFound {
            contact_id: "c1".into(),
            address: "ann@x.com".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "handle_not_found");
        assert_eq!(value["address"], "ann@x.com");
    }
}
