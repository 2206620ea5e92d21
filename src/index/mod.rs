pub mod bplus_tree;
pub mod iterator;
pub mod key_comparator;

pub use bplus_tree::BPlusTree;
pub use iterator::IndexIterator;
pub use key_comparator::{IntegerComparator, KeyComparator, ReverseComparator};
