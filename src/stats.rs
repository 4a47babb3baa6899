//! Database statistics for `chx stats`.
//!
//! A quick summary of what has been ingested: contact counts, how many
//! contacts have at least one cached handle, and the number of blobs.

use anyhow::Result;

use crate::config::Config;
use crate::store::{SqliteStore, Store};

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.db).await?;
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Contact Harness — Database Stats");
    println!("================================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Contacts:     {}", stats.contacts);
    println!(
        "  With handles: {} / {} ({}%)",
        stats.contacts_with_handles,
        stats.contacts,
        if stats.contacts > 0 {
            (stats.contacts_with_handles * 100) / stats.contacts
        } else {
            0
        }
    );
    println!("  Blobs:        {}", stats.blobs);
    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
