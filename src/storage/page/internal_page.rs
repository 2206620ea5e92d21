use std::cmp::Ordering;

use crate::buffer::BufferPoolManager;
use crate::common::{ArborError, Key, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::index::KeyComparator;

use super::tree_page::{
    get_u32, put_u32, MAX_SIZE_OFFSET, PAGE_ID_OFFSET, PAGE_TYPE_OFFSET, PARENT_PAGE_ID_OFFSET,
    SIZE_OFFSET, TREE_PAGE_HEADER_SIZE,
};
use super::{TreePage, TreePageType};

// Each entry is a separator key followed by a child page id. The key in
// slot 0 is a dummy: routing never consults it, so the page effectively
// stores `size` children separated by `size - 1` keys.
const KEY_SIZE: usize = 4;
const CHILD_SIZE: usize = 4;
const ENTRY_SIZE: usize = KEY_SIZE + CHILD_SIZE;

/// Largest `max_size` an internal page can be configured with.
pub fn internal_page_capacity() -> usize {
    (PAGE_SIZE - TREE_PAGE_HEADER_SIZE) / ENTRY_SIZE
}

fn entry_offset(index: usize) -> usize {
    TREE_PAGE_HEADER_SIZE + index * ENTRY_SIZE
}

/// Mutable view over an internal page.
///
/// Structural moves transfer children between pages, so every such operation
/// takes the buffer pool and re-stamps each moved child's parent pointer
/// (fetch, set, unpin dirty). Skipping the adoption leaves a dangling parent
/// link that only surfaces on the next upward propagation.
pub struct InternalPage<'a> {
    data: &'a mut [u8],
}

impl<'a> InternalPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId, parent_id: PageId, max_size: usize) {
        self.data[PAGE_TYPE_OFFSET] = TreePageType::Internal as u8;
        put_u32(self.data, SIZE_OFFSET, 0);
        put_u32(self.data, MAX_SIZE_OFFSET, max_size as u32);
        put_u32(self.data, PAGE_ID_OFFSET, page_id.as_u32());
        put_u32(self.data, PARENT_PAGE_ID_OFFSET, parent_id.as_u32());
    }

    pub fn size(&self) -> usize {
        get_u32(self.data, SIZE_OFFSET) as usize
    }

    fn set_size(&mut self, size: usize) {
        put_u32(self.data, SIZE_OFFSET, size as u32);
    }

    pub fn max_size(&self) -> usize {
        get_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(get_u32(self.data, PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> PageId {
        PageId::new(get_u32(self.data, PARENT_PAGE_ID_OFFSET))
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        put_u32(self.data, PARENT_PAGE_ID_OFFSET, parent.as_u32());
    }

    pub fn key_at(&self, index: usize) -> Key {
        get_u32(self.data, entry_offset(index))
    }

    pub fn set_key_at(&mut self, index: usize, key: Key) {
        put_u32(self.data, entry_offset(index), key);
    }

    pub fn value_at(&self, index: usize) -> PageId {
        PageId::new(get_u32(self.data, entry_offset(index) + KEY_SIZE))
    }

    fn set_entry(&mut self, index: usize, key: Key, child: PageId) {
        let offset = entry_offset(index);
        put_u32(self.data, offset, key);
        put_u32(self.data, offset + KEY_SIZE, child.as_u32());
    }

    /// Slot holding `child`, or None if it is not among this page's children.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Routes `key` to the child whose subtree covers it. Separator scanning
    /// starts at slot 1; slot 0's key is never consulted.
    ///
    /// With `from_insert` set (only used when positioning a freshly split
    /// sibling's separator), a key sorting before the whole page returns
    /// INVALID so the caller knows the new entry belongs in slot 0.
    pub fn lookup(&self, key: Key, comparator: &dyn KeyComparator, from_insert: bool) -> PageId {
        let size = self.size();
        if size == 0 {
            return INVALID_PAGE_ID;
        }

        for i in 1..size {
            match comparator.compare(self.key_at(i), key) {
                Ordering::Equal => return self.value_at(i),
                Ordering::Greater => {
                    if from_insert
                        && comparator.compare(self.key_at(0), key) == Ordering::Greater
                    {
                        return INVALID_PAGE_ID;
                    }
                    return self.value_at(i - 1);
                }
                Ordering::Less => {}
            }
        }

        self.value_at(size - 1)
    }

    /// Turns a freshly allocated empty page into the root produced by a
    /// split: `left_child` in slot 0, `key` separating it from `right_child`
    /// in slot 1. Both children are adopted.
    pub fn populate_new_root(
        &mut self,
        left_child: PageId,
        key: Key,
        right_child: PageId,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        self.set_entry(0, 0, left_child); // slot 0 key is a dummy
        self.set_entry(1, key, right_child);

        self.adopt(left_child, bpm)?;
        self.adopt(right_child, bpm)?;

        self.set_size(2);
        Ok(())
    }

    /// Inserts `(key, new_child)` immediately after the slot holding
    /// `old_child`, adopting the new child. Passing INVALID as `old_child`
    /// means the key sorts before everything on the page: the current slot-0
    /// entry is displaced rightward and the new pair takes slot 0.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: Key,
        new_child: PageId,
        bpm: &BufferPoolManager,
    ) -> Result<usize> {
        self.adopt(new_child, bpm)?;

        if old_child == INVALID_PAGE_ID {
            let displaced_key = self.key_at(0);
            let displaced_child = self.value_at(0);
            self.set_entry(0, key, new_child);
            return self.insert_node_after(new_child, displaced_key, displaced_child, bpm);
        }

        let index = self.value_index(old_child).ok_or_else(|| {
            ArborError::IndexCorrupted(format!(
                "child {} missing from internal page {}",
                old_child,
                self.page_id()
            ))
        })?;

        let size = self.size();
        self.data.copy_within(
            entry_offset(index + 1)..entry_offset(size),
            entry_offset(index + 2),
        );
        self.set_entry(index + 1, key, new_child);
        self.set_size(size + 1);

        Ok(size + 1)
    }

    /// Splits this page into the (empty) `recipient`. The split point is
    /// `⌈(size+1)/2⌉`, pulled one slot left when the pending insertion lands
    /// in the left half, so both halves end up at least half full once the
    /// insertion completes. Moved children are adopted by the recipient.
    pub fn move_half_to(
        &mut self,
        recipient: &mut InternalPage,
        insertion_index: usize,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size();
        let mut split_index = (size + 2) / 2;
        if insertion_index < self.min_size() {
            split_index -= 1;
        }

        let moved: Vec<(Key, PageId)> = (split_index..size)
            .map(|i| (self.key_at(i), self.value_at(i)))
            .collect();
        recipient.copy_n_from(&moved, bpm)?;
        self.set_size(split_index);

        Ok(())
    }

    /// Folds every entry onto the end of `recipient` during a coalesce.
    /// `middle_key` is the separator taken from the parent; it replaces this
    /// page's dummy slot-0 key so the merged run stays ordered.
    pub fn move_all_to(
        &mut self,
        recipient: &mut InternalPage,
        middle_key: Key,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size();
        self.set_key_at(0, middle_key);

        let moved: Vec<(Key, PageId)> = (0..size)
            .map(|i| (self.key_at(i), self.value_at(i)))
            .collect();
        recipient.copy_n_from(&moved, bpm)?;
        self.set_size(0);

        Ok(())
    }

    /// Moves this page's first entry onto the end of `recipient`, threading
    /// the parent separator through as the entry's key.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut InternalPage,
        middle_key: Key,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        self.set_key_at(0, middle_key);
        recipient.copy_n_from(&[(self.key_at(0), self.value_at(0))], bpm)?;

        let size = self.size();
        self.data
            .copy_within(entry_offset(1)..entry_offset(size), entry_offset(0));
        self.set_size(size - 1);

        Ok(())
    }

    /// Moves this page's last entry onto the front of `recipient`. The old
    /// dummy key of the recipient becomes `middle_key` as it shifts to
    /// slot 1; the moved entry lands in slot 0 as the new dummy.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut InternalPage,
        middle_key: Key,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size();
        recipient.copy_first_from(self.key_at(size - 1), self.value_at(size - 1), middle_key, bpm)?;
        self.set_size(size - 1);

        Ok(())
    }

    /// Shift-left removal of the entry at `index`.
    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        self.data.copy_within(
            entry_offset(index + 1)..entry_offset(size),
            entry_offset(index),
        );
        self.set_size(size - 1);
    }

    /// Removes and returns the sole remaining child. Only meaningful during
    /// root adjustment, when `size == 1`.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        let child = self.value_at(0);
        self.set_size(self.size() - 1);
        child
    }

    /// Appends entries, adopting each child.
    fn copy_n_from(&mut self, entries: &[(Key, PageId)], bpm: &BufferPoolManager) -> Result<()> {
        let mut index = self.size();
        for &(key, child) in entries {
            self.set_entry(index, key, child);
            self.adopt(child, bpm)?;
            index += 1;
        }
        self.set_size(index);
        Ok(())
    }

    /// Prepends one entry, adopting its child; the displaced slot-0 key is
    /// rewritten to `middle_key` before the shift.
    fn copy_first_from(
        &mut self,
        key: Key,
        child: PageId,
        middle_key: Key,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        self.set_key_at(0, middle_key);
        self.adopt(child, bpm)?;

        let size = self.size();
        self.data
            .copy_within(entry_offset(0)..entry_offset(size), entry_offset(1));
        self.set_entry(0, key, child);
        self.set_size(size + 1);

        Ok(())
    }

    /// Re-stamps `child_id`'s parent pointer to this page.
    fn adopt(&self, child_id: PageId, bpm: &BufferPoolManager) -> Result<()> {
        let frame = bpm.fetch_page(child_id)?;
        {
            let mut data = frame.write_data();
            TreePage::new(&mut data[..]).set_parent_page_id(self.page_id());
        }
        bpm.unpin_page(child_id, true);
        Ok(())
    }
}

/// Read-only internal view for descent and the printers.
pub struct InternalPageRef<'a> {
    data: &'a [u8],
}

impl<'a> InternalPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> usize {
        get_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(get_u32(self.data, PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> PageId {
        PageId::new(get_u32(self.data, PARENT_PAGE_ID_OFFSET))
    }

    pub fn key_at(&self, index: usize) -> Key {
        get_u32(self.data, entry_offset(index))
    }

    pub fn value_at(&self, index: usize) -> PageId {
        PageId::new(get_u32(self.data, entry_offset(index) + KEY_SIZE))
    }

    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    pub fn lookup(&self, key: Key, comparator: &dyn KeyComparator, from_insert: bool) -> PageId {
        let size = self.size();
        if size == 0 {
            return INVALID_PAGE_ID;
        }

        for i in 1..size {
            match comparator.compare(self.key_at(i), key) {
                Ordering::Equal => return self.value_at(i),
                Ordering::Greater => {
                    if from_insert
                        && comparator.compare(self.key_at(0), key) == Ordering::Greater
                    {
                        return INVALID_PAGE_ID;
                    }
                    return self.value_at(i - 1);
                }
                Ordering::Less => {}
            }
        }

        self.value_at(size - 1)
    }
}
