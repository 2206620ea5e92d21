use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{ArborError, PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};
use crate::storage::page::{HeaderPage, HeaderPageRef};

/// DiskManager reads and writes fixed-size pages against a single database
/// file. Page ids map linearly onto file offsets; page 0 is reserved for the
/// header page and is initialized when the file is first created.
///
/// `allocate_page` is a monotonic counter: page ids are never reused within a
/// run. `deallocate_page` only records the page as free for accounting.
pub struct DiskManager {
    /// Database file handle; the mutex serializes the shared cursor
    file: Mutex<File>,
    /// Path the file was opened from
    db_path: PathBuf,
    /// Number of pages allocated so far
    num_pages: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
    /// Pages handed back through deallocate_page; not reused within a run
    freed_pages: Mutex<Vec<PageId>>,
}

impl DiskManager {
    /// Opens the database file at `db_path`, creating and initializing it
    /// (header page included) if it does not exist or is empty. An existing
    /// file must carry a valid header page.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            file: Mutex::new(file),
            db_path,
            num_pages: AtomicU32::new(num_pages.max(1)),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            freed_pages: Mutex::new(Vec::new()),
        };

        if num_pages == 0 {
            dm.init_header_page()?;
        } else {
            dm.validate_header_page()?;
        }

        Ok(dm)
    }

    fn init_header_page(&self) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        HeaderPage::new(&mut data).init();
        self.write_page(HEADER_PAGE_ID, &data)
    }

    fn validate_header_page(&self) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        self.read_page(HEADER_PAGE_ID, &mut data)?;

        if !HeaderPageRef::new(&data).is_valid() {
            return Err(ArborError::InvalidDatabaseFile);
        }
        Ok(())
    }

    /// Reads a page from disk into the provided buffer. A read past the end
    /// of the file yields zeroes, matching a freshly allocated page.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page and returns its id. The page is materialized on
    /// disk as zeroes so a subsequent read observes a blank page.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst));

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Records `page_id` as no longer in use. Ids are not recycled within a
    /// run, so this only feeds the accounting below.
    pub fn deallocate_page(&self, page_id: PageId) {
        self.freed_pages.lock().push(page_id);
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_freed_pages(&self) -> usize {
        self.freed_pages.lock().len()
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_manager_new() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        // The header page is pre-allocated.
        assert_eq!(dm.num_pages(), 1);

        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(1));
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let page_id = dm.allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_read_past_end_is_zeroed() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(PageId::new(50), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        let page_id = {
            let dm = DiskManager::new(&path).unwrap();
            let page_id = dm.allocate_page().unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(page_id, &data).unwrap();
            page_id
        };

        let dm = DiskManager::new(&path).unwrap();
        assert_eq!(dm.num_pages(), 2);

        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut data).unwrap();
        assert_eq!(data[0], 123);
    }

    #[test]
    fn test_disk_manager_rejects_garbage_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), vec![0xABu8; PAGE_SIZE * 2]).unwrap();

        assert!(matches!(
            DiskManager::new(temp_file.path()),
            Err(ArborError::InvalidDatabaseFile)
        ));
    }

    #[test]
    fn test_disk_manager_deallocate_accounting() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let a = dm.allocate_page().unwrap();
        let b = dm.allocate_page().unwrap();
        dm.deallocate_page(a);
        assert_eq!(dm.num_freed_pages(), 1);

        // Ids are never handed out twice within a run.
        let c = dm.allocate_page().unwrap();
        assert!(c > b);
    }
}
