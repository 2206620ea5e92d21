use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// A buffer frame: one page-sized byte buffer and the id of the page that
/// currently occupies it.
///
/// The rest of the per-frame state (pin count, dirty bit) lives in the
/// pool's frame table, not here: every one of those transitions happens
/// under the pool latch, so they are plain fields over there. The bytes are
/// different; holders read and write them after the latch is released, so
/// they sit behind their own reader/writer lock and concurrent readers of a
/// pinned page do not serialize on the pool.
///
/// The resident page id is stamped by the pool while the frame has no
/// holders and only read by holders afterwards; a relaxed atomic is enough.
pub struct Frame {
    frame_id: FrameId,
    page_id: AtomicU32,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.0),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// The page resident in this frame, INVALID_PAGE_ID when empty.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Relaxed))
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Relaxed);
    }

    /// Returns a read guard over the page bytes.
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Returns a write guard over the page bytes. The holder must unpin with
    /// `is_dirty = true` afterwards.
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Copies `data` into the frame.
    pub(crate) fn copy_from(&self, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(data);
    }

    /// Copies the frame contents into `data`.
    pub(crate) fn copy_to(&self, data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.copy_from_slice(&self.data.read()[..]);
    }

    /// Clears the frame for reuse: no resident page, zeroed bytes.
    pub(crate) fn reset(&self) {
        self.set_page_id(INVALID_PAGE_ID);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_starts_empty() {
        let frame = Frame::new(FrameId::new(3));
        assert_eq!(frame.frame_id(), FrameId::new(3));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert!(frame.read_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_frame_page_id_stamp() {
        let frame = Frame::new(FrameId::new(0));

        frame.set_page_id(PageId::new(5));
        assert_eq!(frame.page_id(), PageId::new(5));
    }

    #[test]
    fn test_frame_data_round_trip() {
        let frame = Frame::new(FrameId::new(0));

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[PAGE_SIZE - 1] = 7;
        frame.copy_from(&data);

        let mut read_back = [0u8; PAGE_SIZE];
        frame.copy_to(&mut read_back);
        assert_eq!(read_back[0], 42);
        assert_eq!(read_back[PAGE_SIZE - 1], 7);
    }

    #[test]
    fn test_frame_reset() {
        let frame = Frame::new(FrameId::new(0));

        frame.set_page_id(PageId::new(5));
        frame.copy_from(&[1u8; PAGE_SIZE]);

        frame.reset();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert!(frame.read_data().iter().all(|&b| b == 0));
    }
}
