//! Messaging source connectivity check for `chx sources`.

use anyhow::Result;

use crate::config::Config;
use crate::source::{BlueBubblesSource, MessageSource};

/// Ping the configured server and count its contacts.
///
/// Prints a status table and never fails on an unreachable server; only a
/// broken configuration (e.g. a missing password variable) is an error.
pub async fn check_sources(config: &Config) -> Result<()> {
    let source = BlueBubblesSource::new(&config.source)?;
    let host = config.source.base_url();

    let (status, contacts) = match source.ping().await {
        Ok(()) => match source.list_contacts().await {
            Ok(contacts) => ("OK".to_string(), contacts.len().to_string()),
            Err(e) => (format!("CONTACTS FAILED ({})", e), "-".to_string()),
        },
        Err(e) => (format!("UNREACHABLE ({})", e), "-".to_string()),
    };

    println!("{:<12} {:<40} {:<10} STATUS", "SOURCE", "HOST", "CONTACTS");
    println!("{:<12} {:<40} {:<10} {}", "bluebubbles", host, contacts, status);

    let embedding = if config.embedding.is_enabled() {
        format!(
            "{} ({})",
            config.embedding.provider,
            config.embedding.model.as_deref().unwrap_or("-")
        )
    } else {
        "disabled (placeholder vectors)".to_string()
    };
    println!();
    println!("embedding: {}", embedding);

    Ok(())
}
