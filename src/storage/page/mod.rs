mod header_page;
mod internal_page;
mod leaf_page;
mod tree_page;

pub use header_page::*;
pub use internal_page::*;
pub use leaf_page::*;
pub use tree_page::{TreePage, TreePageRef, TreePageType, TREE_PAGE_HEADER_SIZE};
