mod common;

use std::sync::Arc;

use arbor::buffer::BufferPoolManager;
use arbor::common::{Key, PageId, RecordId, SlotId};
use arbor::index::{BPlusTree, IntegerComparator};
use arbor::storage::page::{InternalPageRef, LeafPageRef, TreePageRef};

use common::{check_tree_invariants, create_bpm};

fn rid(key: Key) -> RecordId {
    RecordId::new(PageId::new(key), SlotId::new(0))
}

fn small_tree(bpm: &Arc<BufferPoolManager>) -> BPlusTree {
    BPlusTree::new("test", Arc::clone(bpm), Arc::new(IntegerComparator), 4, 4).unwrap()
}

fn leaf_keys(bpm: &BufferPoolManager, leaf_id: PageId) -> Vec<Key> {
    let frame = bpm.fetch_page(leaf_id).unwrap();
    let keys = {
        let data = frame.read_data();
        let leaf = LeafPageRef::new(&data[..]);
        (0..leaf.size()).map(|i| leaf.key_at(i)).collect()
    };
    bpm.unpin_page(leaf_id, false);
    keys
}

#[test]
fn test_remove_absent_key_is_noop() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    for key in [1, 2, 3] {
        tree.insert(key, rid(key)).unwrap();
    }

    tree.remove(42).unwrap();
    tree.remove(42).unwrap();

    for key in [1, 2, 3] {
        assert_eq!(tree.get_value(key).unwrap(), Some(rid(key)));
    }
    check_tree_invariants(&tree, &bpm);
}

#[test]
fn test_remove_from_root_leaf_without_underflow() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    for key in [1, 2, 3] {
        tree.insert(key, rid(key)).unwrap();
    }
    tree.remove(2).unwrap();

    assert_eq!(tree.get_value(2).unwrap(), None);
    assert_eq!(tree.get_value(1).unwrap(), Some(rid(1)));
    assert_eq!(tree.get_value(3).unwrap(), Some(rid(3)));
    check_tree_invariants(&tree, &bpm);
}

#[test]
fn test_underflow_redistributes_from_right_sibling() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    // Leaves [1,2] and [3,4,5] under a root with separator 3.
    for key in [1, 2, 3, 4, 5] {
        tree.insert(key, rid(key)).unwrap();
    }

    // Removing 1 leaves the left leaf with a single record. Its right
    // sibling holds three, so one record moves over instead of a merge:
    // leaves become [2,3] and [4,5] and the separator becomes 4.
    tree.remove(1).unwrap();

    let root_id = tree.root_page_id();
    let frame = bpm.fetch_page(root_id).unwrap();
    let (separator, left_id, right_id) = {
        let data = frame.read_data();
        let root = InternalPageRef::new(&data[..]);
        assert_eq!(root.size(), 2);
        (root.key_at(1), root.value_at(0), root.value_at(1))
    };
    bpm.unpin_page(root_id, false);

    assert_eq!(separator, 4);
    assert_eq!(leaf_keys(&bpm, left_id), vec![2, 3]);
    assert_eq!(leaf_keys(&bpm, right_id), vec![4, 5]);

    check_tree_invariants(&tree, &bpm);
}

#[test]
fn test_underflow_redistributes_from_left_sibling() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    // Leaves [0,1,2] and [3,4,5] under a root with separator 3.
    for key in [1, 2, 3, 4, 5, 0] {
        tree.insert(key, rid(key)).unwrap();
    }

    // Two removals bring the right leaf down to one record; the left
    // sibling holds three, so its last record moves over.
    tree.remove(5).unwrap();
    tree.remove(4).unwrap();

    // [0,1,2] lends its last record: leaves [0,1] and [2,3], separator 2.
    let root_id = tree.root_page_id();
    let frame = bpm.fetch_page(root_id).unwrap();
    let (separator, left_id, right_id) = {
        let data = frame.read_data();
        let root = InternalPageRef::new(&data[..]);
        (root.key_at(1), root.value_at(0), root.value_at(1))
    };
    bpm.unpin_page(root_id, false);

    assert_eq!(separator, 2);
    assert_eq!(leaf_keys(&bpm, left_id), vec![0, 1]);
    assert_eq!(leaf_keys(&bpm, right_id), vec![2, 3]);

    check_tree_invariants(&tree, &bpm);
}

#[test]
fn test_underflow_coalesces_and_collapses_root() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    // Leaves [1,2] and [3,4] under a two-child root.
    for key in [1, 2, 3, 4] {
        tree.insert(key, rid(key)).unwrap();
    }
    let old_root = tree.root_page_id();

    // Removing 4 underflows the right leaf; together the siblings fit in
    // one page, so they merge and the root hands over to the survivor.
    tree.remove(4).unwrap();

    let root_id = tree.root_page_id();
    assert_ne!(root_id, old_root);

    let frame = bpm.fetch_page(root_id).unwrap();
    {
        let data = frame.read_data();
        let page = TreePageRef::new(&data[..]);
        assert!(page.is_leaf());
        assert!(page.is_root());
    }
    bpm.unpin_page(root_id, false);

    assert_eq!(leaf_keys(&bpm, root_id), vec![1, 2, 3]);
    check_tree_invariants(&tree, &bpm);
}

#[test]
fn test_delete_everything_empties_tree() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    for key in [1, 2, 3, 4, 5] {
        tree.insert(key, rid(key)).unwrap();
    }
    for key in [1, 2, 3, 4, 5] {
        tree.remove(key).unwrap();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(3).unwrap(), None);
    assert!(tree.iter().unwrap().next().is_none());
}

#[test]
fn test_reinsert_after_emptying() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree(&bpm);

    tree.insert(1, rid(1)).unwrap();
    tree.remove(1).unwrap();
    assert!(tree.is_empty());

    // A fresh root must re-register under the existing header record.
    tree.insert(2, rid(2)).unwrap();
    assert_eq!(tree.get_value(2).unwrap(), Some(rid(2)));
    check_tree_invariants(&tree, &bpm);
}

#[test]
fn test_sequential_delete_ascending() {
    let (bpm, _temp) = create_bpm(30);
    let mut tree = small_tree(&bpm);

    for key in 0..100 {
        tree.insert(key, rid(key)).unwrap();
    }
    for key in 0..100 {
        tree.remove(key).unwrap();
        assert_eq!(tree.get_value(key).unwrap(), None);
        check_tree_invariants(&tree, &bpm);
    }
    assert!(tree.is_empty());
}

#[test]
fn test_sequential_delete_descending() {
    let (bpm, _temp) = create_bpm(30);
    let mut tree = small_tree(&bpm);

    for key in 0..100 {
        tree.insert(key, rid(key)).unwrap();
    }
    for key in (0..100).rev() {
        tree.remove(key).unwrap();
        check_tree_invariants(&tree, &bpm);
    }
    assert!(tree.is_empty());
}

#[test]
fn test_random_delete_order() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree(&bpm);

    let mut keys: Vec<Key> = (0..300).collect();
    keys.shuffle(&mut thread_rng());
    for &key in &keys {
        tree.insert(key, rid(key)).unwrap();
    }

    keys.shuffle(&mut thread_rng());
    for (i, &key) in keys.iter().enumerate() {
        tree.remove(key).unwrap();
        if i % 25 == 0 {
            check_tree_invariants(&tree, &bpm);
        }
    }
    assert!(tree.is_empty());
}

#[test]
fn test_interleaved_inserts_and_deletes() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree(&bpm);

    let mut keys: Vec<Key> = (0..200).collect();
    keys.shuffle(&mut thread_rng());

    // Insert everything, then delete the odd keys in random order.
    for &key in &keys {
        tree.insert(key, rid(key)).unwrap();
    }
    let (removed, kept): (Vec<Key>, Vec<Key>) = keys.iter().partition(|&&k| k % 2 == 1);
    for &key in &removed {
        tree.remove(key).unwrap();
    }

    check_tree_invariants(&tree, &bpm);

    // Exactly the even keys survive, in order.
    let scanned: Vec<Key> = tree
        .iter()
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect();
    let mut expected: Vec<Key> = kept;
    expected.sort_unstable();
    assert_eq!(scanned, expected);

    for &key in &removed {
        assert_eq!(tree.get_value(key).unwrap(), None);
    }
}

#[test]
fn test_deleted_pages_are_reclaimed() {
    let (bpm, _temp) = create_bpm(20);
    let mut tree = small_tree(&bpm);

    for key in 0..50 {
        tree.insert(key, rid(key)).unwrap();
    }
    for key in 0..50 {
        tree.remove(key).unwrap();
    }
    assert!(tree.is_empty());

    // Every tree page went back to the free list; only the header page
    // remains resident.
    assert_eq!(bpm.free_frame_count(), bpm.pool_size() - 1);
}
