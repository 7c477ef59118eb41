//! Per-project memory log and hybrid search index.
//!
//! memlog keeps two views of a project's history:
//!
//! | View | Storage | Role |
//! |------|---------|------|
//! | **Memory log** | `memory/<source>/<YYYY-MM-DD>.jsonl[.gz]` | Append-only raw truth, one file per event date |
//! | **Index** | `db/embeddings/<key>.db` (SQLite + FTS5) | Derived, queryable view over the log and knowledge files |
//!
//! Sync producers append [`memory::MemoryEntry`] values to the log; the
//! [`index::Indexer`] projects log records and curated knowledge files into
//! index rows; [`index::HybridSearch`] ranks them by a weighted sum of cosine
//! similarity and normalized bm25.
//!
//! # Architecture
//!
//! - **Storage**: JSONL day-files with atomic temp-file + rename writes, gzip
//!   and archival lifecycle; SQLite with an external-content FTS5 table
//! - **Embeddings**: pluggable [`embedding::EmbeddingProvider`] (local feature
//!   hashing by default, OpenAI-compatible HTTP optional), vectors stored as
//!   little-endian f32 BLOBs and scored by brute force over a recency cap
//! - **Concurrency**: synchronous, one SQLite connection per thread per store
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: Per-thread connection cache, schema, migrations, and health checks
//! - [`embedding`]: Embedding providers, retry wrapper, and vector math
//! - [`layout`]: Deterministic on-disk directory layout
//! - [`memory`]: JSONL memory log: append, read, update, compress, archive
//! - [`metadata`]: Shared project registry, sync cursors, read markers
//! - [`index`]: Embedding store, indexer, and hybrid search
//! - [`unread`]: Cutoff-based unread detection
//! - [`workspace`]: Wires the pieces together for one home directory

pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod layout;
pub mod memory;
pub mod metadata;
pub mod unread;
pub mod workspace;
