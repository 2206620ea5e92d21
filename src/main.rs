use std::sync::Arc;

use arbor::buffer::BufferPoolManager;
use arbor::index::{BPlusTree, IntegerComparator};
use arbor::storage::disk::DiskManager;
use arbor::{PageId, RecordId, SlotId};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Arbor - a disk-backed ordered index");
    println!("===================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    let bpm = Arc::new(BufferPoolManager::new(16, disk_manager));
    println!("Opened {} behind a 16-frame buffer pool", db_path);

    let comparator = Arc::new(IntegerComparator);
    let mut tree = BPlusTree::new("demo", Arc::clone(&bpm), comparator.clone(), 4, 4)
        .expect("failed to create index");

    // Small fanout so a handful of keys already builds a multi-level tree.
    for key in [5u32, 9, 1, 7, 3, 8, 2, 6, 4, 10] {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        tree.insert(key, rid).expect("insert failed");
    }
    println!("Inserted 10 keys; root page is {}\n", tree.root_page_id());

    println!("{}", tree.to_pretty_string().expect("pretty print failed"));

    print!("Forward scan:");
    for entry in tree.iter().expect("iterator failed") {
        let (key, rid) = entry.expect("scan failed");
        print!(" {}->{}", key, rid.page_id.as_u32());
    }
    println!("\n");

    for key in [1u32, 2, 3] {
        tree.remove(key).expect("remove failed");
    }
    println!("Removed keys 1..=3:");
    println!("{}", tree.to_pretty_string().expect("pretty print failed"));

    bpm.flush_all_pages().expect("flush failed");

    let reopened = BPlusTree::open("demo", Arc::clone(&bpm), comparator, 4, 4)
        .expect("failed to reopen index");
    let found = reopened.get_value(7).expect("lookup failed");
    println!("After reopen, key 7 -> {:?}", found.map(|r| r.page_id.as_u32()));

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
