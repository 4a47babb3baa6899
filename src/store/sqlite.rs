//! SQLite-backed [`Store`] implementation.
//!
//! Profiles are stored as JSON documents in `contacts`, with the handle
//! map in its own column so it can be updated independently. Names,
//! emails and phones are mirrored into the `contacts_fts` FTS5 table for
//! prefix search. Blobs live in `blobs`, keyed by their deterministic id.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::DbConfig;
use crate::db;
use crate::migrate;
use crate::models::{ContactProfile, HandleMap, MessageBlob};

use super::{query_terms, Store, StoreStats};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(db: &DbConfig) -> Result<Self> {
        let pool = db::connect(db).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to migrate database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// FTS5 prefix query: every term must prefix-match some token.
fn fts_prefix_query(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"*", t))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn decode_contact(document_json: &str, handles_json: &str) -> Result<ContactProfile> {
    let mut profile: ContactProfile =
        serde_json::from_str(document_json).context("Corrupt contact document")?;
    let handles: HandleMap = serde_json::from_str(handles_json).unwrap_or_default();
    profile.annotate_handles(&handles);
    Ok(profile)
}

fn join_values<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_contact(&self, profile: &ContactProfile) -> Result<()> {
        let mut document = profile.clone();
        document.annotate_handles(&HandleMap::new());
        let document_json = serde_json::to_string(&document)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO contacts (id, display_name, first_name, last_name, document_json, handles_json, updated_at)
            VALUES (?, ?, ?, ?, ?, '{}', ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                document_json = excluded.document_json,
                handles_json = '{}',
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&document_json)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM contacts_fts WHERE contact_id = ?")
            .bind(&profile.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO contacts_fts (contact_id, display_name, first_name, last_name, emails, phones) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(join_values(profile.emails.iter().map(|a| a.value.as_str())))
        .bind(join_values(profile.phone_numbers.iter().map(|a| a.value.as_str())))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_handles(&self, contact_id: &str, handles: &HandleMap) -> Result<()> {
        let handles_json = serde_json::to_string(handles)?;
        let result = sqlx::query("UPDATE contacts SET handles_json = ? WHERE id = ?")
            .bind(&handles_json)
            .bind(contact_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("contact not found: {}", contact_id);
        }
        Ok(())
    }

    async fn upsert_blob(&self, blob: &MessageBlob) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO blobs (id, contact_id, ordinal, text, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(blob.id())
        .bind(&blob.contact_id)
        .bind(blob.ordinal)
        .bind(&blob.text)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contact(&self, id: &str) -> Result<Option<ContactProfile>> {
        let row = sqlx::query("SELECT document_json, handles_json FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(decode_contact(
                row.get("document_json"),
                row.get("handles_json"),
            )?)),
            None => Ok(None),
        }
    }

    async fn get_handles(&self, contact_id: &str) -> Result<HandleMap> {
        let handles_json: Option<String> =
            sqlx::query_scalar("SELECT handles_json FROM contacts WHERE id = ?")
                .bind(contact_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(handles_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default())
    }

    async fn search_contacts(&self, query: &str, limit: i64) -> Result<Vec<ContactProfile>> {
        let fts_query = match fts_prefix_query(query) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let rows = sqlx::query(
            r#"
            SELECT c.document_json, c.handles_json
            FROM contacts_fts
            JOIN contacts c ON c.id = contacts_fts.contact_id
            WHERE contacts_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| decode_contact(row.get("document_json"), row.get("handles_json")))
            .collect()
    }

    async fn list_blobs(&self, contact_id: &str) -> Result<Vec<MessageBlob>> {
        let rows = sqlx::query(
            "SELECT contact_id, ordinal, text FROM blobs WHERE contact_id = ? ORDER BY ordinal ASC",
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MessageBlob {
                contact_id: row.get("contact_id"),
                ordinal: row.get("ordinal"),
                text: row.get("text"),
            })
            .collect())
    }

    async fn delete_blobs_from(&self, contact_id: &str, from_ordinal: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM blobs WHERE contact_id = ? AND ordinal >= ?")
            .bind(contact_id)
            .bind(from_ordinal)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let contacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.pool)
            .await?;
        let contacts_with_handles: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE handles_json != '{}'")
                .fetch_one(&self.pool)
                .await?;
        let blobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            contacts,
            contacts_with_handles,
            blobs,
        })
    }

    async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM contacts_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM blobs").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM contacts").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_query_quotes_terms() {
        assert_eq!(
            fts_prefix_query("Ann@X.com").as_deref(),
            Some("\"ann\"* \"x\"* \"com\"*")
        );
        assert_eq!(fts_prefix_query("  "), None);
    }
}
