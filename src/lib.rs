//! # tabvault
//!
//! A local-first vault for browser session snapshots with an adaptive
//! semantic index.
//!
//! Browser extensions drop session exports (`*_session.json`) into an inbox.
//! Each sweep validates them, archives the raw bytes under a content digest,
//! records them in SQLite, and feeds the new sessions to a TF-IDF index that
//! scores them against named missions and learns from relevance feedback.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Inbox  │──▶│   Ingestor   │──▶│ vault/ SQLite │
//! │ *.json  │   │ digest+check │   │  FTS5 + tabs  │
//! └─────────┘   └──────┬───────┘   └───────┬───────┘
//!                      │ quarantine/       │
//!                      ▼                   ▼
//!               ┌──────────────┐    ┌─────────────┐
//!               │   Observer   │──▶ │ checkpoint  │
//!               │ TF-IDF index │    │   (JSON)    │
//!               └──────────────┘    └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tabvault init                         # create directories and database
//! tabvault add-mission research "academic research paper"
//! tabvault ingest                       # sweep the inbox once
//! tabvault watch --interval 10          # or keep sweeping
//! tabvault search "rust async"
//! tabvault similar "machine learning"
//! tabvault export-graph --output graph.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and `init` |
//! | [`sqlite_store`] | SQLite metadata store |
//! | [`archive`] | Atomic vault and quarantine writes |
//! | [`ingest`] | Inbox sweep |
//! | [`observer`] | Semantic index driver and checkpointing |
//! | [`watch`] | Periodic sweep loop |
//! | [`reconcile`] | Vault/store/index repair |
//! | [`search`] | Keyword and similarity search |
//! | [`index_cmd`] | Missions, feedback and re-observation |
//! | [`export`] | Co-occurrence graph export |
//! | [`stats`] | Vault statistics |
//! | [`logging`] | Tracing subscriber setup |

pub mod archive;
pub mod config;
pub mod db;
pub mod export;
pub mod index_cmd;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod observer;
pub mod reconcile;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod watch;
