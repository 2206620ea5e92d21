use std::cmp::Ordering;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, Frame};
use crate::common::{Key, RecordId, Result};
use crate::storage::page::LeafPageRef;

use super::KeyComparator;

/// Forward-only cursor over the leaf sibling chain.
///
/// The iterator keeps its current leaf pinned between calls; advancing past
/// a leaf unpins it clean and pins the next one through the sibling link.
/// Dropping the iterator releases the remaining pin. Never witnesses dirty
/// pages: scans are read-only.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    /// Current pinned leaf; None marks the end position
    frame: Option<Arc<Frame>>,
    /// Slot within the current leaf
    index: usize,
}

impl IndexIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        frame: Option<Arc<Frame>>,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            comparator,
            frame,
            index,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>, comparator: Arc<dyn KeyComparator>) -> Self {
        Self::new(bpm, comparator, None, 0)
    }

    pub fn is_end(&self) -> bool {
        self.frame.is_none()
    }

    /// The record under the cursor, if any. A cursor parked past the last
    /// slot of a leaf (possible right after `iter_from` with a key beyond
    /// the leaf) reports None until advanced.
    pub fn current(&self) -> Option<(Key, RecordId)> {
        let frame = self.frame.as_ref()?;
        let data = frame.read_data();
        let leaf = LeafPageRef::new(&data[..]);

        if self.index < leaf.size() {
            Some((leaf.key_at(self.index), leaf.record_at(self.index)))
        } else {
            None
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(Key, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.frame.as_ref()?;

            let (size, next_page_id) = {
                let data = frame.read_data();
                let leaf = LeafPageRef::new(&data[..]);
                (leaf.size(), leaf.next_page_id())
            };

            if self.index < size {
                let item = {
                    let data = frame.read_data();
                    let leaf = LeafPageRef::new(&data[..]);
                    (leaf.key_at(self.index), leaf.record_at(self.index))
                };
                self.index += 1;
                return Some(Ok(item));
            }

            // Exhausted this leaf: release it and hop the sibling link.
            let page_id = frame.page_id();
            self.frame = None;
            self.bpm.unpin_page(page_id, false);
            self.index = 0;

            if !next_page_id.is_valid() {
                return None;
            }
            match self.bpm.fetch_page(next_page_id) {
                Ok(next_frame) => self.frame = Some(next_frame),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl PartialEq for IndexIterator {
    /// Two end cursors are equal; otherwise cursors compare equal when their
    /// current keys compare equal under the comparator.
    fn eq(&self, other: &Self) -> bool {
        match (self.current(), other.current()) {
            (None, None) => true,
            (Some((a, _)), Some((b, _))) => self.comparator.compare(a, b) == Ordering::Equal,
            _ => false,
        }
    }
}

impl Drop for IndexIterator {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.bpm.unpin_page(frame.page_id(), false);
        }
    }
}
