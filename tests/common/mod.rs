#![allow(dead_code)]

use std::sync::Arc;

use arbor::buffer::BufferPoolManager;
use arbor::common::{Key, PageId, INVALID_PAGE_ID};
use arbor::index::BPlusTree;
use arbor::storage::disk::DiskManager;
use arbor::storage::page::{InternalPageRef, LeafPageRef, TreePageRef};

use tempfile::NamedTempFile;

pub fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    (bpm, temp_file)
}

/// Walks the whole tree and asserts the structural invariants: parent
/// pointers, occupancy bounds, strictly increasing key order, and that the
/// sibling chain visits every leaf exactly once in order. Also asserts that
/// no prior operation left a page pinned.
pub fn check_tree_invariants(tree: &BPlusTree, bpm: &BufferPoolManager) {
    if tree.is_empty() {
        return;
    }

    let mut leaves = Vec::new();
    let mut last_key = None;
    visit(
        bpm,
        tree.root_page_id(),
        INVALID_PAGE_ID,
        true,
        &mut leaves,
        &mut last_key,
    );

    let mut chain = Vec::new();
    let mut current = leaves[0];
    while current.is_valid() {
        chain.push(current);
        let frame = bpm.fetch_page(current).unwrap();
        let next = {
            let data = frame.read_data();
            LeafPageRef::new(&data[..]).next_page_id()
        };
        bpm.unpin_page(current, false);
        current = next;
    }
    assert_eq!(
        chain, leaves,
        "sibling chain must visit every leaf exactly once, in order"
    );
}

fn visit(
    bpm: &BufferPoolManager,
    page_id: PageId,
    expected_parent: PageId,
    is_root: bool,
    leaves: &mut Vec<PageId>,
    last_key: &mut Option<Key>,
) {
    let frame = bpm.fetch_page(page_id).unwrap();
    assert_eq!(
        bpm.pin_count(page_id),
        Some(1),
        "page {page_id} was left pinned by a prior operation"
    );

    let children = {
        let data = frame.read_data();
        let page = TreePageRef::new(&data[..]);

        assert_eq!(
            page.parent_page_id(),
            expected_parent,
            "page {page_id} has a dangling parent pointer"
        );

        if page.is_leaf() {
            let leaf = LeafPageRef::new(&data[..]);

            assert!(page.size() <= page.max_size() - 1, "leaf {page_id} overfull");
            if !is_root {
                assert!(page.size() >= page.min_size(), "leaf {page_id} underfull");
            }

            for i in 0..leaf.size() {
                let key = leaf.key_at(i);
                if let Some(prev) = *last_key {
                    assert!(key > prev, "key order violated at leaf {page_id}");
                }
                *last_key = Some(key);
            }

            leaves.push(page_id);
            Vec::new()
        } else {
            let internal = InternalPageRef::new(&data[..]);

            assert!(page.size() <= page.max_size(), "internal {page_id} overfull");
            if is_root {
                assert!(page.size() >= 2, "internal root must keep two children");
            } else {
                assert!(
                    page.size() >= page.min_size(),
                    "internal {page_id} underfull"
                );
            }

            (0..internal.size()).map(|i| internal.value_at(i)).collect()
        }
    };
    bpm.unpin_page(page_id, false);

    for child in children {
        visit(bpm, child, page_id, false, leaves, last_key);
    }
}
