use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{ArborError, FrameId, PageId, Result, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruReplacer};

/// Per-frame bookkeeping. Pin counts and dirty bits only ever change under
/// the pool latch, so they are plain fields here rather than atomics on the
/// frame itself.
#[derive(Clone, Copy, Default)]
struct FrameMeta {
    /// Number of active holders of the frame
    pin_count: u32,
    /// Whether the resident page differs from its on-disk copy
    is_dirty: bool,
}

/// Bookkeeping shared by every public operation, guarded by one pool latch.
struct PoolState {
    /// Maps resident page ids to the frames holding them
    page_table: HashMap<PageId, FrameId>,
    /// Frames never used or reclaimed through delete_page
    free_list: VecDeque<FrameId>,
    /// Pin count and dirty bit for each frame, indexed by frame id
    meta: Vec<FrameMeta>,
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames.
///
/// `fetch_page` and `new_page` hand back a pinned frame; every such call must
/// be paired with exactly one `unpin_page`, with the dirty flag reflecting
/// whether the holder mutated the page. Victims for eviction come from the
/// free list first and from the LRU replacer otherwise; dirty victims are
/// written back before their frame is reused.
///
/// Every public operation holds the pool latch for its entire duration,
/// including any disk I/O it performs.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// Pool latch over the page table, free list and frame metadata
    state: Mutex<PoolState>,
    /// Eviction candidates, ordered by recency of unpin
    replacer: LruReplacer,
    /// Disk I/O goes through the scheduler's worker thread
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                meta: vec![FrameMeta::default(); pool_size],
            }),
            replacer: LruReplacer::new(pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Fetches `page_id` into the pool and returns its frame, pinned.
    ///
    /// A cached page is pinned and returned directly. Otherwise a frame is
    /// taken from the free list, or evicted from the replacer (writing a
    /// dirty victim back first), and the page is read from disk. Fails with
    /// `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if !page_id.is_valid() {
            return Err(ArborError::InvalidPageId(page_id));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.meta[frame_id.as_usize()].pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(Arc::clone(&self.frames[frame_id.as_usize()]));
        }

        let frame_id = self.acquire_frame(state)?;
        let frame = &self.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        state.meta[frame_id.as_usize()] = FrameMeta {
            pin_count: 1,
            is_dirty: false,
        };

        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok(Arc::clone(frame))
    }

    /// Drops one pin on `page_id`, recording `is_dirty` if the holder wrote
    /// to the page. The dirty flag is only ever raised here, never cleared.
    /// Returns false if the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let meta = &mut state.meta[frame_id.as_usize()];
        if meta.pin_count == 0 {
            return false;
        }

        if is_dirty {
            meta.is_dirty = true;
        }

        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        true
    }

    /// Writes `page_id` back to disk regardless of its dirty flag, then
    /// clears the flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(ArborError::InvalidPageId(page_id));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };

        let mut data = [0u8; PAGE_SIZE];
        self.frames[frame_id.as_usize()].copy_to(&mut data);
        self.disk_scheduler.write_sync(page_id, &data)?;
        state.meta[frame_id.as_usize()].is_dirty = false;

        Ok(true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for (&page_id, &frame_id) in state.page_table.iter() {
            let mut data = [0u8; PAGE_SIZE];
            self.frames[frame_id.as_usize()].copy_to(&mut data);
            self.disk_scheduler.write_sync(page_id, &data)?;
            state.meta[frame_id.as_usize()].is_dirty = false;
        }

        Ok(())
    }

    /// Allocates a fresh page on disk and pins it into a zeroed frame.
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.free_list.is_empty() && self.replacer.size() == 0 {
            return Err(ArborError::BufferPoolFull);
        }

        let frame_id = self.acquire_frame(state)?;
        let frame = &self.frames[frame_id.as_usize()];

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

        frame.set_page_id(page_id);
        state.meta[frame_id.as_usize()] = FrameMeta {
            pin_count: 1,
            is_dirty: false,
        };

        state.page_table.insert(page_id, frame_id);

        trace!(target: "arbor::buffer", page = page_id.as_u32(), frame = frame_id.as_u32(), "new page");

        Ok((page_id, Arc::clone(frame)))
    }

    /// Removes `page_id` from the pool and deallocates it on disk.
    ///
    /// Returns `Ok(true)` for a page that is not resident (nothing to do;
    /// the disk allocator is deliberately left untouched in that case) and
    /// `Ok(false)` for a resident page that is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };

        if state.meta[frame_id.as_usize()].pin_count != 0 {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        self.frames[frame_id.as_usize()].reset();
        state.meta[frame_id.as_usize()] = FrameMeta::default();
        state.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id);

        trace!(target: "arbor::buffer", page = page_id.as_u32(), frame = frame_id.as_u32(), "deleted page");

        Ok(true)
    }

    /// Returns the pin count of `page_id`, or None if it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.meta[frame_id.as_usize()].pin_count)
    }

    /// Returns the dirty flag of `page_id`, or None if it is not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.meta[frame_id.as_usize()].is_dirty)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Obtains a reusable frame, preferring the free list over eviction.
    /// An evicted dirty page is written back before the frame is handed out.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(ArborError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if state.meta[frame_id.as_usize()].is_dirty {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.write_sync(old_page_id, &data)?;
            trace!(target: "arbor::buffer", page = old_page_id.as_u32(), frame = frame_id.as_u32(), "wrote back dirty victim");
        }

        state.page_table.remove(&old_page_id);
        frame.reset();
        state.meta[frame_id.as_usize()] = FrameMeta::default();

        Ok(frame_id)
    }
}
