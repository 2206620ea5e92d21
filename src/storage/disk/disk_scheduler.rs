use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::common::{ArborError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// A disk I/O request queued for the scheduler's worker thread. Buffers are
/// owned by the request; completion is signalled back over a rendezvous
/// channel carrying the outcome.
enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        done: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a single background worker thread.
/// Requests are processed in submission order; the synchronous entry points
/// block until the worker reports completion.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    /// Dropped on shutdown so the worker drains and exits
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = unbounded::<DiskRequest>();

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver));

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads `page_id` into `data`, blocking until the worker finishes.
    pub fn read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.submit(DiskRequest::Read { page_id, done: tx })?;

        let page = rx
            .recv()
            .map_err(|e| ArborError::DiskScheduler(format!("read completion lost: {e}")))??;
        data.copy_from_slice(&page[..]);
        Ok(())
    }

    /// Writes `data` to `page_id`, blocking until the worker finishes.
    pub fn write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut owned = Box::new([0u8; PAGE_SIZE]);
        owned.copy_from_slice(data);

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.submit(DiskRequest::Write {
            page_id,
            data: owned,
            done: tx,
        })?;

        rx.recv()
            .map_err(|e| ArborError::DiskScheduler(format!("write completion lost: {e}")))?
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .as_ref()
            .expect("scheduler is running")
            .send(request)
            .map_err(|e| ArborError::DiskScheduler(format!("failed to queue request: {e}")))
    }

    /// Worker loop: runs until every sender is dropped, then exits.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver {
            match request {
                DiskRequest::Read { page_id, done } => {
                    let mut page = Box::new([0u8; PAGE_SIZE]);
                    let outcome = disk_manager
                        .read_page(page_id, &mut page[..])
                        .map(|()| page);
                    let _ = done.send(outcome);
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    done,
                } => {
                    let _ = done.send(disk_manager.write_page(page_id, &data[..]));
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain outstanding requests.
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler.read_sync(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_requests_in_order() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        for i in 0..10u8 {
            let mut data = [0u8; PAGE_SIZE];
            data[0] = i;
            scheduler.write_sync(page_id, &data).unwrap();
        }

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler.read_sync(page_id, &mut read_data).unwrap();
        assert_eq!(read_data[0], 9);
    }
}
