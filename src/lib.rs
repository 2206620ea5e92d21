//! Arbor - an embeddable, disk-backed ordered index
//!
//! This crate implements a page-oriented B+tree mapping fixed-width keys to
//! record identifiers, persisted through a bounded buffer pool with
//! approximate-LRU eviction.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and page layouts
//!   - `DiskManager`: reads and writes pages against a single database file
//!   - `DiskScheduler`: funnels page I/O through a background worker thread
//!   - `LeafPage` / `InternalPage`: typed views over tree page bytes
//!   - `HeaderPage`: the page-0 registry of index name -> root page id
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: pins pages for callers, tracks dirty state,
//!     writes victims back before reuse
//!   - `LruReplacer`: chooses eviction victims by recency of unpin
//!   - `Frame`: the page bytes behind a reader/writer lock
//!
//! - **Index** (`index`): the ordered index itself
//!   - `BPlusTree`: point lookup, unique insert, delete, with
//!     split/merge/redistribute keeping the occupancy invariants
//!   - `IndexIterator`: forward scan across the leaf sibling chain
//!   - `KeyComparator`: the ordering seam supplied at construction
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use arbor::buffer::BufferPoolManager;
//! use arbor::index::{BPlusTree, IntegerComparator};
//! use arbor::storage::disk::DiskManager;
//! use arbor::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("index.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let mut tree = BPlusTree::new("orders", bpm, Arc::new(IntegerComparator), 32, 32).unwrap();
//! tree.insert(42, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert!(tree.get_value(42).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{ArborError, Key, PageId, RecordId, Result, SlotId};
