//! Retrieval indices over compressed observations.
//!
//! [`bm25::SearchIndex`] (keyword) and [`vector::VectorIndex`] (semantic) are plain
//! in-memory structures; [`hybrid::HybridSearch`] fuses them and hydrates results
//! from the StateStore; [`persistence::IndexPersistence`] snapshots both.
//!
//! The indices are shared as `Arc<RwLock<_>>`. Locks are only held for synchronous
//! index work, never across an await.

pub mod bm25;
pub mod hybrid;
pub mod persistence;
pub mod vector;

pub use bm25::SearchIndex;
pub use hybrid::{HybridSearch, HybridSearchResult};
pub use persistence::{IndexPersistence, LoadedIndexes};
pub use vector::VectorIndex;
