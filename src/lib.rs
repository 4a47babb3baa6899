//! # Contact Harness
//!
//! Ingests contacts and their message history from a BlueBubbles server
//! into a local SQLite document store, and retrieves a contact's full
//! transcript by exact email or phone number.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ BlueBubbles │──▶│ Pipeline                 │──▶│  SQLite   │
//! │  REST API   │   │ Identity → Handles →     │   │ FTS5      │
//! └─────────────┘   │ Messages → Blobs → Sync  │   └────┬─────┘
//!                   └──────────────────────────┘        │
//!                                                       ▼
//!                                                 ┌──────────┐
//!                                                 │   CLI    │
//!                                                 │  (chx)   │
//!                                                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chx init                      # create database
//! chx sources                   # check the server is reachable
//! chx ingest --progress human   # pull contacts and messages
//! chx get ann@example.com       # print a transcript
//! chx export ann@example.com --output ann.txt
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Source records, profiles, messages, blobs |
//! | [`identity`] | Deterministic contact ids and address normalization |
//! | [`source`] | Messaging source trait and BlueBubbles client |
//! | [`resolve`] | Address → handle resolution with caching |
//! | [`aggregate`] | Paginated message fetching and ordering |
//! | [`chunk`] | Blob chunking and message formatting |
//! | [`sync`] | Ordered, idempotent persistence |
//! | [`ingest`] | Pipeline orchestration, background task, cancellation |
//! | [`retrieve`] | Exact-match contact lookup and transcript export |
//! | [`store`] | Document store trait, SQLite and in-memory backends |
//! | [`embedding`] | Profile vector providers |
//! | [`progress`] | Progress events and reporters |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregate;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod resolve;
pub mod retrieve;
pub mod source;
pub mod sources;
pub mod stats;
pub mod store;
pub mod sync;
