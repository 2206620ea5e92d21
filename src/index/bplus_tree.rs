use std::fmt::Write as _;
use std::sync::Arc;

use tracing::trace;

use crate::buffer::{BufferPoolManager, Frame};
use crate::common::{
    ArborError, Key, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::{
    internal_page_capacity, leaf_page_capacity, HeaderPage, HeaderPageRef, InternalPage,
    InternalPageRef, LeafPage, LeafPageRef, TreePage, TreePageRef,
};

use super::{IndexIterator, KeyComparator};

/// A disk-backed B+tree mapping unique fixed-width keys to record ids.
///
/// Every node access goes through the buffer pool's pin/unpin protocol: each
/// `fetch_page`/`new_page` below is paired with exactly one `unpin_page` on
/// every path, dirty when the holder wrote to the page. The tree itself is
/// not safe for interleaved mutation; callers serialize writers externally.
///
/// The current root's page id is mirrored into the header page registry
/// under `index_name`, so an index can be reattached with [`BPlusTree::open`].
pub struct BPlusTree {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// Whether the header page already carries a record for this index
    registered: bool,
}

impl BPlusTree {
    /// Creates a new, empty index. No pages are allocated until the first
    /// insert materializes a root.
    pub fn new(
        index_name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        Self::validate_options(leaf_max_size, internal_max_size)?;

        Ok(Self {
            index_name: index_name.to_string(),
            root_page_id: INVALID_PAGE_ID,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            registered: false,
        })
    }

    /// Reattaches an index persisted in the header page registry.
    pub fn open(
        index_name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        Self::validate_options(leaf_max_size, internal_max_size)?;

        let header_frame = bpm.fetch_page(HEADER_PAGE_ID)?;
        let root_page_id = {
            let data = header_frame.read_data();
            HeaderPageRef::new(&data[..]).root_page_id(index_name)
        };
        bpm.unpin_page(HEADER_PAGE_ID, false);

        let root_page_id =
            root_page_id.ok_or_else(|| ArborError::IndexNotFound(index_name.to_string()))?;

        Ok(Self {
            index_name: index_name.to_string(),
            root_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            registered: true,
        })
    }

    fn validate_options(leaf_max_size: usize, internal_max_size: usize) -> Result<()> {
        if leaf_max_size < 3 || internal_max_size < 3 {
            return Err(ArborError::InvalidTreeOptions(
                "leaf_max_size and internal_max_size must be at least 3".to_string(),
            ));
        }
        if leaf_max_size > leaf_page_capacity() {
            return Err(ArborError::InvalidTreeOptions(format!(
                "leaf_max_size {} exceeds page capacity {}",
                leaf_max_size,
                leaf_page_capacity()
            )));
        }
        if internal_max_size > internal_page_capacity() {
            return Err(ArborError::InvalidTreeOptions(format!(
                "internal_max_size {} exceeds page capacity {}",
                internal_max_size,
                internal_page_capacity()
            )));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Point lookup.
    pub fn get_value(&self, key: Key) -> Result<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }

        let leaf_frame = self.find_leaf(key, false)?;
        let leaf_page_id = leaf_frame.page_id();

        let result = {
            let data = leaf_frame.read_data();
            LeafPageRef::new(&data[..]).lookup(key, self.comparator.as_ref())
        };
        self.bpm.unpin_page(leaf_page_id, false);

        Ok(result)
    }

    /// Inserts a unique key. Returns false (and changes nothing) if the key
    /// is already present.
    pub fn insert(&mut self, key: Key, value: RecordId) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, value)
    }

    /// Removes `key` if present; absent keys are a no-op.
    pub fn remove(&mut self, key: Key) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let leaf_frame = self.find_leaf(key, false)?;
        let leaf_page_id = leaf_frame.page_id();

        let (removed, underflow) = {
            let mut data = leaf_frame.write_data();
            let mut leaf = LeafPage::new(&mut data[..]);
            let old_size = leaf.size();
            let new_size = leaf.remove_and_delete(key, self.comparator.as_ref());
            (new_size != old_size, new_size < leaf.min_size())
        };

        if !removed {
            self.bpm.unpin_page(leaf_page_id, false);
            return Ok(());
        }

        if underflow {
            self.coalesce_or_redistribute(leaf_frame)
        } else {
            self.bpm.unpin_page(leaf_page_id, true);
            Ok(())
        }
    }

    /// Tears the index down: deallocates every page of the tree and removes
    /// its record from the header page registry. Consumes the tree.
    pub fn drop_index(self) -> Result<()> {
        if self.root_page_id.is_valid() {
            self.delete_subtree(self.root_page_id)?;
        }

        if self.registered {
            let header_frame = self.bpm.fetch_page(HEADER_PAGE_ID)?;
            let result = {
                let mut data = header_frame.write_data();
                HeaderPage::new(&mut data[..]).delete_record(&self.index_name)
            };
            self.bpm.unpin_page(HEADER_PAGE_ID, true);
            result?;
        }

        trace!(target: "arbor::btree", index = self.index_name.as_str(), "dropped index");
        Ok(())
    }

    /// Post-order deletion of a subtree. Each page is unpinned before its
    /// children are visited so only one extra frame is held at a time.
    fn delete_subtree(&self, page_id: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(page_id)?;

        let children = {
            let data = frame.read_data();
            let page = TreePageRef::new(&data[..]);
            if page.is_leaf() {
                Vec::new()
            } else {
                let internal = InternalPageRef::new(&data[..]);
                (0..internal.size()).map(|i| internal.value_at(i)).collect()
            }
        };
        self.bpm.unpin_page(page_id, false);

        for child in children {
            self.delete_subtree(child)?;
        }

        self.bpm.delete_page(page_id)?;
        Ok(())
    }

    /// Forward iterator positioned at the leftmost record.
    pub fn iter(&self) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::end(
                Arc::clone(&self.bpm),
                Arc::clone(&self.comparator),
            ));
        }

        let frame = self.find_leaf(0, true)?;
        Ok(IndexIterator::new(
            Arc::clone(&self.bpm),
            Arc::clone(&self.comparator),
            Some(frame),
            0,
        ))
    }

    /// Forward iterator positioned at the first record whose key is >= `key`.
    pub fn iter_from(&self, key: Key) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::end(
                Arc::clone(&self.bpm),
                Arc::clone(&self.comparator),
            ));
        }

        let frame = self.find_leaf(key, false)?;
        let index = {
            let data = frame.read_data();
            LeafPageRef::new(&data[..]).key_index(key, self.comparator.as_ref())
        };
        Ok(IndexIterator::new(
            Arc::clone(&self.bpm),
            Arc::clone(&self.comparator),
            Some(frame),
            index,
        ))
    }

    /// Descends from the root to the leaf covering `key` (or the leftmost
    /// leaf), unpinning every internal page along the way. The returned
    /// frame is pinned; the caller owns its unpin.
    fn find_leaf(&self, key: Key, left_most: bool) -> Result<Arc<Frame>> {
        let mut frame = self.bpm.fetch_page(self.root_page_id)?;

        loop {
            let child_id = {
                let data = frame.read_data();
                let page = TreePageRef::new(&data[..]);
                if page.is_leaf() {
                    None
                } else {
                    let internal = InternalPageRef::new(&data[..]);
                    Some(if left_most {
                        internal.value_at(0)
                    } else {
                        internal.lookup(key, self.comparator.as_ref(), false)
                    })
                }
            };

            match child_id {
                None => return Ok(frame),
                Some(child_id) => {
                    self.bpm.unpin_page(frame.page_id(), false);
                    frame = self.bpm.fetch_page(child_id)?;
                }
            }
        }
    }

    fn start_new_tree(&mut self, key: Key, value: RecordId) -> Result<()> {
        let (page_id, frame) = self.bpm.new_page()?;

        {
            let mut data = frame.write_data();
            let mut leaf = LeafPage::new(&mut data[..]);
            leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, value, self.comparator.as_ref());
        }

        self.root_page_id = page_id;
        let insert_record = !self.registered;
        self.update_root_page_id(insert_record)?;
        self.registered = true;

        self.bpm.unpin_page(page_id, true);

        trace!(target: "arbor::btree", root = page_id.as_u32(), "started new tree");
        Ok(())
    }

    fn insert_into_leaf(&mut self, key: Key, value: RecordId) -> Result<bool> {
        let leaf_frame = self.find_leaf(key, false)?;
        let leaf_page_id = leaf_frame.page_id();

        let needs_split = {
            let mut data = leaf_frame.write_data();
            let mut leaf = LeafPage::new(&mut data[..]);

            if leaf.lookup(key, self.comparator.as_ref()).is_some() {
                drop(data);
                self.bpm.unpin_page(leaf_page_id, false);
                return Ok(false);
            }

            let new_size = leaf.insert(key, value, self.comparator.as_ref());
            // Reaching max_size is the overflow signal: the last slot is
            // never stably occupied.
            new_size == leaf.max_size()
        };

        if needs_split {
            self.split_leaf(&leaf_frame)?;
        }

        self.bpm.unpin_page(leaf_page_id, true);
        Ok(true)
    }

    /// Splits an overfull leaf, then installs the new separator upward.
    fn split_leaf(&mut self, old_frame: &Arc<Frame>) -> Result<()> {
        let old_page_id = old_frame.page_id();
        let (new_page_id, new_frame) = self.bpm.new_page()?;

        let (separator_key, parent_page_id) = {
            let mut old_data = old_frame.write_data();
            let mut new_data = new_frame.write_data();
            let mut old_leaf = LeafPage::new(&mut old_data[..]);
            let mut new_leaf = LeafPage::new(&mut new_data[..]);

            let parent_page_id = old_leaf.parent_page_id();
            new_leaf.init(new_page_id, parent_page_id, self.leaf_max_size);
            old_leaf.move_half_to(&mut new_leaf);

            (new_leaf.key_at(0), parent_page_id)
        };

        trace!(
            target: "arbor::btree",
            left = old_page_id.as_u32(),
            right = new_page_id.as_u32(),
            separator = separator_key,
            "split leaf"
        );

        self.insert_into_parent(old_page_id, parent_page_id, separator_key, new_page_id)?;
        self.bpm.unpin_page(new_page_id, true);
        Ok(())
    }

    /// Installs `key` as the separator between `old_page_id` and
    /// `new_page_id` in their parent, splitting the parent (and recursing)
    /// if it is already full. No page data locks are held on entry, so the
    /// adoption fetches inside the internal page operations are free to run.
    fn insert_into_parent(
        &mut self,
        old_page_id: PageId,
        old_parent_page_id: PageId,
        key: Key,
        new_page_id: PageId,
    ) -> Result<()> {
        if !old_parent_page_id.is_valid() {
            // The split reached the root: grow the tree by one level.
            let (root_page_id, root_frame) = self.bpm.new_page()?;
            {
                let mut data = root_frame.write_data();
                let mut root = InternalPage::new(&mut data[..]);
                root.init(root_page_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(old_page_id, key, new_page_id, &self.bpm)?;
            }

            self.root_page_id = root_page_id;
            self.update_root_page_id(false)?;
            self.bpm.unpin_page(root_page_id, true);

            trace!(target: "arbor::btree", root = root_page_id.as_u32(), "grew new root");
            return Ok(());
        }

        let parent_frame = self.bpm.fetch_page(old_parent_page_id)?;

        let split_index = {
            let mut data = parent_frame.write_data();
            let mut parent = InternalPage::new(&mut data[..]);

            if parent.size() + 1 <= parent.max_size() {
                parent.insert_node_after(old_page_id, key, new_page_id, &self.bpm)?;
                None
            } else {
                // Full parent: remember where the pending entry would land
                // so the split point keeps both halves at least half full.
                let index = parent.value_index(old_page_id).ok_or_else(|| {
                    ArborError::IndexCorrupted(format!(
                        "page {} missing from its parent {}",
                        old_page_id, old_parent_page_id
                    ))
                })?;
                Some(index)
            }
        };

        let insertion_index = match split_index {
            None => {
                self.bpm.unpin_page(old_parent_page_id, true);
                return Ok(());
            }
            Some(index) => index,
        };

        let (new_parent_page_id, new_parent_frame) = self.bpm.new_page()?;

        let (propagated_key, grandparent_page_id) = {
            let mut parent_data = parent_frame.write_data();
            let mut new_data = new_parent_frame.write_data();
            let mut parent = InternalPage::new(&mut parent_data[..]);
            let mut new_parent = InternalPage::new(&mut new_data[..]);

            let grandparent_page_id = parent.parent_page_id();
            new_parent.init(new_parent_page_id, grandparent_page_id, self.internal_max_size);
            parent.move_half_to(&mut new_parent, insertion_index, &self.bpm)?;

            if insertion_index < parent.min_size() {
                parent.insert_node_after(old_page_id, key, new_page_id, &self.bpm)?;
            } else {
                let anchor = new_parent.lookup(key, self.comparator.as_ref(), true);
                new_parent.insert_node_after(anchor, key, new_page_id, &self.bpm)?;
            }

            (new_parent.key_at(0), grandparent_page_id)
        };

        trace!(
            target: "arbor::btree",
            left = old_parent_page_id.as_u32(),
            right = new_parent_page_id.as_u32(),
            separator = propagated_key,
            "split internal"
        );

        self.insert_into_parent(
            old_parent_page_id,
            grandparent_page_id,
            propagated_key,
            new_parent_page_id,
        )?;
        self.bpm.unpin_page(old_parent_page_id, true);
        self.bpm.unpin_page(new_parent_page_id, true);
        Ok(())
    }

    /// Restores the occupancy invariant for an underfull page, borrowing
    /// from a sibling when the pair holds enough records and merging
    /// otherwise. Consumes the caller's pin on `node_frame`.
    fn coalesce_or_redistribute(&mut self, node_frame: Arc<Frame>) -> Result<()> {
        let node_page_id = node_frame.page_id();

        let (parent_page_id, node_size, node_is_leaf, node_max_size) = {
            let data = node_frame.read_data();
            let page = TreePageRef::new(&data[..]);
            (
                page.parent_page_id(),
                page.size(),
                page.is_leaf(),
                page.max_size(),
            )
        };

        if !parent_page_id.is_valid() {
            return self.adjust_root(node_frame);
        }

        let parent_frame = self.bpm.fetch_page(parent_page_id)?;

        let (index, neighbor_page_id) = {
            let data = parent_frame.read_data();
            let parent = InternalPageRef::new(&data[..]);
            let index = parent.value_index(node_page_id).ok_or_else(|| {
                ArborError::IndexCorrupted(format!(
                    "page {} missing from its parent {}",
                    node_page_id, parent_page_id
                ))
            })?;
            // Leftmost pages borrow from the right sibling, everyone else
            // from the left.
            let neighbor_page_id = if index == 0 {
                parent.value_at(1)
            } else {
                parent.value_at(index - 1)
            };
            (index, neighbor_page_id)
        };

        let neighbor_frame = self.bpm.fetch_page(neighbor_page_id)?;
        let neighbor_size = {
            let data = neighbor_frame.read_data();
            TreePageRef::new(&data[..]).size()
        };

        let leaf_adjustment = if node_is_leaf { 1 } else { 0 };
        if node_size + neighbor_size + leaf_adjustment > node_max_size {
            self.redistribute(&neighbor_frame, &node_frame, &parent_frame, index)?;
            self.bpm.unpin_page(parent_page_id, true);
            Ok(())
        } else {
            let parent_underflow =
                self.coalesce(&neighbor_frame, &node_frame, &parent_frame, index)?;
            if parent_underflow {
                self.coalesce_or_redistribute(parent_frame)
            } else {
                self.bpm.unpin_page(parent_page_id, true);
                Ok(())
            }
        }
    }

    /// Moves one record across the sibling boundary and refreshes the parent
    /// separator. Unpins node and neighbor.
    fn redistribute(
        &self,
        neighbor_frame: &Arc<Frame>,
        node_frame: &Arc<Frame>,
        parent_frame: &Arc<Frame>,
        index: usize,
    ) -> Result<()> {
        let node_page_id = node_frame.page_id();
        let neighbor_page_id = neighbor_frame.page_id();

        let node_is_leaf = {
            let data = node_frame.read_data();
            TreePageRef::new(&data[..]).is_leaf()
        };

        let boundary_key = if node_is_leaf {
            let mut neighbor_data = neighbor_frame.write_data();
            let mut node_data = node_frame.write_data();
            let mut neighbor = LeafPage::new(&mut neighbor_data[..]);
            let mut node = LeafPage::new(&mut node_data[..]);

            if index == 0 {
                neighbor.move_first_to_end_of(&mut node);
                neighbor.key_at(0)
            } else {
                neighbor.move_last_to_front_of(&mut node);
                node.key_at(0)
            }
        } else {
            let middle_key = {
                let data = parent_frame.read_data();
                let parent = InternalPageRef::new(&data[..]);
                if index == 0 {
                    parent.key_at(1)
                } else {
                    parent.key_at(index)
                }
            };

            let mut neighbor_data = neighbor_frame.write_data();
            let mut node_data = node_frame.write_data();
            let mut neighbor = InternalPage::new(&mut neighbor_data[..]);
            let mut node = InternalPage::new(&mut node_data[..]);

            if index == 0 {
                neighbor.move_first_to_end_of(&mut node, middle_key, &self.bpm)?;
                neighbor.key_at(0)
            } else {
                neighbor.move_last_to_front_of(&mut node, middle_key, &self.bpm)?;
                node.key_at(0)
            }
        };

        {
            let mut data = parent_frame.write_data();
            let mut parent = InternalPage::new(&mut data[..]);
            if index == 0 {
                parent.set_key_at(1, boundary_key);
            } else {
                parent.set_key_at(index, boundary_key);
            }
        }

        trace!(
            target: "arbor::btree",
            node = node_page_id.as_u32(),
            neighbor = neighbor_page_id.as_u32(),
            boundary = boundary_key,
            "redistributed"
        );

        self.bpm.unpin_page(node_page_id, true);
        self.bpm.unpin_page(neighbor_page_id, true);
        Ok(())
    }

    /// Folds node and neighbor into one page, deletes the emptied page and
    /// drops its separator from the parent. Unpins node and neighbor.
    /// Returns whether the parent fell below its minimum occupancy.
    fn coalesce(
        &self,
        neighbor_frame: &Arc<Frame>,
        node_frame: &Arc<Frame>,
        parent_frame: &Arc<Frame>,
        index: usize,
    ) -> Result<bool> {
        let node_page_id = node_frame.page_id();
        let neighbor_page_id = neighbor_frame.page_id();

        let node_is_leaf = {
            let data = node_frame.read_data();
            TreePageRef::new(&data[..]).is_leaf()
        };

        let middle_key = {
            let data = parent_frame.read_data();
            let parent = InternalPageRef::new(&data[..]);
            if index == 0 {
                parent.key_at(1)
            } else {
                parent.key_at(index)
            }
        };

        {
            let mut neighbor_data = neighbor_frame.write_data();
            let mut node_data = node_frame.write_data();

            if node_is_leaf {
                let mut neighbor = LeafPage::new(&mut neighbor_data[..]);
                let mut node = LeafPage::new(&mut node_data[..]);
                if index == 0 {
                    neighbor.move_all_to(&mut node);
                } else {
                    node.move_all_to(&mut neighbor);
                }
            } else {
                let mut neighbor = InternalPage::new(&mut neighbor_data[..]);
                let mut node = InternalPage::new(&mut node_data[..]);
                if index == 0 {
                    neighbor.move_all_to(&mut node, middle_key, &self.bpm)?;
                } else {
                    node.move_all_to(&mut neighbor, middle_key, &self.bpm)?;
                }
            }
        }

        self.bpm.unpin_page(node_page_id, true);
        self.bpm.unpin_page(neighbor_page_id, true);

        let (survivor, removed, parent_remove_index) = if index == 0 {
            (node_page_id, neighbor_page_id, 1)
        } else {
            (neighbor_page_id, node_page_id, index)
        };
        self.bpm.delete_page(removed)?;

        trace!(
            target: "arbor::btree",
            survivor = survivor.as_u32(),
            removed = removed.as_u32(),
            "coalesced"
        );

        let parent_underflow = {
            let mut data = parent_frame.write_data();
            let mut parent = InternalPage::new(&mut data[..]);
            parent.remove(parent_remove_index);
            parent.size() < parent.min_size()
        };

        Ok(parent_underflow)
    }

    /// Shrinks or clears the root after a delete:
    /// an internal root left with a single child hands the root over to that
    /// child; an emptied leaf root leaves the tree empty. Consumes the
    /// caller's pin on `old_root_frame`.
    fn adjust_root(&mut self, old_root_frame: Arc<Frame>) -> Result<()> {
        let old_root_id = old_root_frame.page_id();

        let (size, is_leaf) = {
            let data = old_root_frame.read_data();
            let page = TreePageRef::new(&data[..]);
            (page.size(), page.is_leaf())
        };

        if !is_leaf && size == 1 {
            let new_root_id = {
                let mut data = old_root_frame.write_data();
                InternalPage::new(&mut data[..]).remove_and_return_only_child()
            };
            self.root_page_id = new_root_id;

            let child_frame = self.bpm.fetch_page(new_root_id)?;
            {
                let mut data = child_frame.write_data();
                TreePage::new(&mut data[..]).set_parent_page_id(INVALID_PAGE_ID);
            }
            self.bpm.unpin_page(new_root_id, true);

            self.update_root_page_id(false)?;
            self.bpm.unpin_page(old_root_id, true);
            self.bpm.delete_page(old_root_id)?;

            trace!(
                target: "arbor::btree",
                old_root = old_root_id.as_u32(),
                new_root = new_root_id.as_u32(),
                "collapsed root"
            );
            return Ok(());
        }

        if size == 0 {
            self.root_page_id = INVALID_PAGE_ID;
            self.update_root_page_id(false)?;
            self.bpm.unpin_page(old_root_id, true);
            self.bpm.delete_page(old_root_id)?;

            trace!(target: "arbor::btree", old_root = old_root_id.as_u32(), "tree emptied");
            return Ok(());
        }

        // The root may legally sit below min_size; nothing structural to do.
        self.bpm.unpin_page(old_root_id, true);
        Ok(())
    }

    /// Mirrors `root_page_id` into the header page registry: an insert the
    /// first time this index materializes, an update on every later change.
    fn update_root_page_id(&self, insert_record: bool) -> Result<()> {
        let header_frame = self.bpm.fetch_page(HEADER_PAGE_ID)?;

        let result = {
            let mut data = header_frame.write_data();
            let mut header = HeaderPage::new(&mut data[..]);
            if insert_record {
                header.insert_record(&self.index_name, self.root_page_id)
            } else {
                header.update_record(&self.index_name, self.root_page_id)
            }
        };
        self.bpm.unpin_page(HEADER_PAGE_ID, true);

        result
    }

    /// Renders the tree as indented text, one node per line. Read-only.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut out = String::new();
        if self.is_empty() {
            out.push_str("(empty tree)\n");
            return Ok(out);
        }
        self.write_pretty(self.root_page_id, 0, &mut out)?;
        Ok(out)
    }

    fn write_pretty(&self, page_id: PageId, depth: usize, out: &mut String) -> Result<()> {
        let frame = self.bpm.fetch_page(page_id)?;
        let indent = "  ".repeat(depth);

        let children = {
            let data = frame.read_data();
            let page = TreePageRef::new(&data[..]);

            if page.is_leaf() {
                let leaf = LeafPageRef::new(&data[..]);
                let keys: Vec<String> = (0..leaf.size())
                    .map(|i| leaf.key_at(i).to_string())
                    .collect();
                let _ = writeln!(
                    out,
                    "{}Leaf[{}] next={} keys=[{}]",
                    indent,
                    leaf.page_id().as_u32(),
                    leaf.next_page_id().as_u32(),
                    keys.join(",")
                );
                Vec::new()
            } else {
                let internal = InternalPageRef::new(&data[..]);
                let separators: Vec<String> = (1..internal.size())
                    .map(|i| internal.key_at(i).to_string())
                    .collect();
                let _ = writeln!(
                    out,
                    "{}Internal[{}] separators=[{}]",
                    indent,
                    internal.page_id().as_u32(),
                    separators.join(",")
                );
                (0..internal.size()).map(|i| internal.value_at(i)).collect()
            }
        };
        self.bpm.unpin_page(page_id, false);

        for child in children {
            self.write_pretty(child, depth + 1, out)?;
        }
        Ok(())
    }

    /// Renders the tree in Graphviz dot format. Read-only.
    pub fn to_dot(&self) -> Result<String> {
        let mut out = String::from("digraph BPlusTree {\n");
        if !self.is_empty() {
            self.write_dot(self.root_page_id, &mut out)?;
        }
        out.push_str("}\n");
        Ok(out)
    }

    fn write_dot(&self, page_id: PageId, out: &mut String) -> Result<()> {
        let frame = self.bpm.fetch_page(page_id)?;

        let children = {
            let data = frame.read_data();
            let page = TreePageRef::new(&data[..]);

            if page.is_leaf() {
                let leaf = LeafPageRef::new(&data[..]);
                let id = leaf.page_id().as_u32();
                let keys: Vec<String> = (0..leaf.size())
                    .map(|i| leaf.key_at(i).to_string())
                    .collect();
                let _ = writeln!(
                    out,
                    "  LEAF_{} [shape=record color=green label=\"P{}|{}\"];",
                    id,
                    id,
                    keys.join("|")
                );
                if leaf.next_page_id().is_valid() {
                    let next = leaf.next_page_id().as_u32();
                    let _ = writeln!(out, "  LEAF_{id} -> LEAF_{next};");
                    let _ = writeln!(out, "  {{rank=same LEAF_{id} LEAF_{next}}};");
                }
                Vec::new()
            } else {
                let internal = InternalPageRef::new(&data[..]);
                let id = internal.page_id().as_u32();
                let separators: Vec<String> = (0..internal.size())
                    .map(|i| {
                        if i == 0 {
                            " ".to_string()
                        } else {
                            internal.key_at(i).to_string()
                        }
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  INT_{} [shape=record color=pink label=\"P{}|{}\"];",
                    id,
                    id,
                    separators.join("|")
                );
                (0..internal.size()).map(|i| internal.value_at(i)).collect()
            }
        };
        self.bpm.unpin_page(page_id, false);

        for child in &children {
            let kind = {
                let child_frame = self.bpm.fetch_page(*child)?;
                let is_leaf = {
                    let data = child_frame.read_data();
                    TreePageRef::new(&data[..]).is_leaf()
                };
                self.bpm.unpin_page(*child, false);
                if is_leaf {
                    "LEAF"
                } else {
                    "INT"
                }
            };
            let _ = writeln!(out, "  INT_{} -> {}_{};", page_id.as_u32(), kind, child.as_u32());
            self.write_dot(*child, out)?;
        }
        Ok(())
    }
}
