pub mod config;
pub mod error;
pub mod types;

pub use config::{
    DEFAULT_BUFFER_POOL_SIZE, HEADER_PAGE_ID, INVALID_FRAME_ID, INVALID_PAGE_ID, PAGE_SIZE,
};
pub use error::{ArborError, Result};
pub use types::{FrameId, Key, Lsn, PageId, RecordId, SlotId, INVALID_LSN};
