//! # tabvault Core
//!
//! Shared, I/O-free logic for tabvault: session models, payload validation
//! and content digests, the adaptive semantic index (vocabulary, vectorizer,
//! missions, feedback), similarity ranking, checkpoint (de)serialization,
//! URL co-occurrence aggregation, and the metadata store abstraction.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The `tabvault`
//! application crate owns archiving, SQLite, and the CLI.

pub mod checkpoint;
pub mod cooccur;
pub mod feedback;
pub mod index;
pub mod mission;
pub mod models;
pub mod rank;
pub mod store;
pub mod validate;
pub mod vectorize;
pub mod vocab;

pub use index::{IndexError, SemanticIndex};
pub use models::{ArchivedEntry, ContentDigest, SessionRecord, Tab};
