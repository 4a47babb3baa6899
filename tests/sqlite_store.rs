//! SQLite store behaviour against a temporary database file.

use contact_harness::config::DbConfig;
use contact_harness::embedding::DisabledProvider;
use contact_harness::identity::normalize_contact;
use contact_harness::ingest::{run_ingest, CancelToken, IngestOptions};
use contact_harness::models::{ContactProfile, ContactRecord, HandleId, HandleMap, MessageBlob, EMBEDDING_DIMS};
use contact_harness::retrieve::{resolve_contact, retrieve, suggest_contacts};
use contact_harness::source::StaticSource;
use contact_harness::store::{SqliteStore, Store};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::unbounded_channel;

async fn open_store(tmp: &TempDir) -> SqliteStore {
    SqliteStore::open(&DbConfig {
        path: tmp.path().join("data").join("chx.sqlite"),
    })
    .await
    .unwrap()
}

fn profile(value: serde_json::Value) -> ContactProfile {
    normalize_contact(&ContactRecord::from_value(value).unwrap())
}

fn blob(contact_id: &str, ordinal: i64, text: &str) -> MessageBlob {
    MessageBlob {
        contact_id: contact_id.to_string(),
        ordinal,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn open_creates_database_and_is_repeatable() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.close().await;
    assert!(tmp.path().join("data").join("chx.sqlite").exists());

    let store = open_store(&tmp).await;
    assert_eq!(store.stats().await.unwrap().contacts, 0);
    store.close().await;
}

#[tokio::test]
async fn upsert_contact_resets_handles_until_updated() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let ann = profile(json!({"displayName": "Ann Lee", "emails": [{"address": "ann@x.com"}]}));

    store.upsert_contact(&ann).await.unwrap();
    let mut handles = HandleMap::new();
    handles.insert("ann@x.com".to_string(), HandleId::from("11"));
    store.update_handles(&ann.id, &handles).await.unwrap();
    assert_eq!(store.get_handles(&ann.id).await.unwrap(), handles);

    let stored = store.get_contact(&ann.id).await.unwrap().unwrap();
    assert_eq!(stored.emails[0].handle, Some(HandleId::from("11")));

    store.upsert_contact(&ann).await.unwrap();
    assert!(store.get_handles(&ann.id).await.unwrap().is_empty());
    assert_eq!(store.stats().await.unwrap().contacts, 1);
    store.close().await;
}

#[tokio::test]
async fn update_handles_requires_existing_contact() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    assert!(store.update_handles("missing", &HandleMap::new()).await.is_err());
    store.close().await;
}

#[tokio::test]
async fn blobs_overwrite_by_id_and_list_in_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert_blob(&blob("c1", 1, "second")).await.unwrap();
    store.upsert_blob(&blob("c1", 0, "first")).await.unwrap();
    store.upsert_blob(&blob("c1", 0, "first again")).await.unwrap();
    store.upsert_blob(&blob("c2", 0, "other")).await.unwrap();

    let blobs = store.list_blobs("c1").await.unwrap();
    assert_eq!(
        blobs,
        vec![blob("c1", 0, "first again"), blob("c1", 1, "second")]
    );

    assert_eq!(store.delete_blobs_from("c1", 1).await.unwrap(), 1);
    assert_eq!(store.list_blobs("c1").await.unwrap().len(), 1);
    assert_eq!(store.list_blobs("c2").await.unwrap().len(), 1);
    store.close().await;
}

#[tokio::test]
async fn prefix_search_then_exact_match() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let a = profile(json!({"displayName": "Ann Lee", "emails": [{"address": "ann@x.com"}]}));
    let b = profile(json!({"displayName": "Ann Lee", "emails": [{"address": "ann@x.company"}]}));
    let c = profile(json!({"displayName": "Bo", "phoneNumbers": [{"address": "(555) 010-2000"}]}));
    for p in [&a, &b, &c] {
        store.upsert_contact(p).await.unwrap();
    }

    let candidates = store.search_contacts("ann@x.com", 50).await.unwrap();
    assert_eq!(candidates.len(), 2);

    assert_eq!(resolve_contact(&store, "Ann@X.Com", 50).await.unwrap().id, a.id);
    assert_eq!(resolve_contact(&store, "ann@x.company", 50).await.unwrap().id, b.id);
    assert_eq!(resolve_contact(&store, "5550102000", 50).await.unwrap().id, c.id);
    assert!(resolve_contact(&store, "ann", 50).await.is_err());

    let names = suggest_contacts(&store, "lee", 10).await.unwrap();
    assert_eq!(names.len(), 2);
    store.close().await;
}

#[tokio::test]
async fn ingest_into_sqlite_and_reset() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut source = StaticSource::new()
        .with_contact(json!({
            "firstName": "Ann",
            "lastName": "Lee",
            "emails": [{"address": "ann@x.com"}]
        }))
        .with_handle("ann@x.com", "11");
    for i in 0..2500 {
        source = source.with_message("11", &format!("m{}", i), i, i % 2 == 0);
    }

    let (tx, _rx) = unbounded_channel();
    let summary = run_ingest(
        &source,
        &store,
        &DisabledProvider::new(EMBEDDING_DIMS),
        &IngestOptions::default(),
        &CancelToken::never(),
        &tx,
    )
    .await
    .unwrap();
    assert_eq!(summary.blobs, 3);

    let transcript = retrieve(&store, "ann@x.com", 50).await.unwrap();
    assert_eq!(transcript.blobs.len(), 3);
    assert!(transcript.render().starts_with("From: Ann Lee\nText: m2499\n"));
    assert_eq!(transcript.contact.semantic_vector.len(), EMBEDDING_DIMS);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.contacts, 1);
    assert_eq!(stats.contacts_with_handles, 1);
    assert_eq!(stats.blobs, 3);

    store.reset().await.unwrap();
    assert_eq!(store.stats().await.unwrap().blobs, 0);
    assert!(resolve_contact(&store, "ann@x.com", 50).await.is_err());
    store.close().await;
}
