//! Memory and retrieval engine for AI coding-agent sessions.
//!
//! Engram ingests compressed session observations and long-term memories,
//! indexes them for combined keyword and semantic retrieval, keeps a
//! confidence-weighted relation graph between memories, and evicts by age,
//! value and capacity so storage stays bounded.
//!
//! # Architecture
//!
//! - **Storage**: a `(scope, key) → JSON` [`state::StateStore`], backed by SQLite
//!   ([`state::SqliteStateStore`]) or memory ([`state::MemoryStateStore`])
//! - **Search**: BM25 with prefix boost plus exact cosine vector search, merged via
//!   Reciprocal Rank Fusion; degrades to BM25-only without an embedder
//! - **Persistence**: debounced index snapshots written back into the store
//! - **Resilience**: circuit breaker and fallback chain around LLM compressors
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, and health checks
//! - [`state`]: The StateStore capability, typed access, and scope names
//! - [`index`]: BM25, vector, hybrid search, and index persistence
//! - [`memory`]: Records, relation graph, forgetting, eviction, export/import
//! - [`embedding`]: The embedding capability and the built-in hashing provider
//! - [`provider`]: The compressor capability, circuit breaker, and fallback chain
//! - [`dedup`]: Short-TTL duplicate suppression for tool observations
//! - [`engine`]: The startup-owned instance that wires everything together

pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod memory;
pub mod provider;
pub mod state;
