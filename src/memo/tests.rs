use super::*;

use tempfile::tempdir;

#[test]
fn db3_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.dbt");
    let mut memo = Db3Memo::create(&path).unwrap();
    assert_eq!(memo.next_free(), 1);

    let block = memo.put(b"timeless").unwrap();
    assert_eq!(block, 1);
    assert_eq!(memo.next_free(), 2);
    assert_eq!(memo.get(block).unwrap(), b"timeless");

    // header persists across reopen
    drop(memo);
    let mut memo = Db3Memo::open(&path).unwrap();
    assert_eq!(memo.next_free(), 2);
    assert_eq!(memo.get(1).unwrap(), b"timeless");
}

#[test]
fn db3_long_payload_spans_blocks() {
    let dir = tempdir().unwrap();
    let mut memo = Db3Memo::create(dir.path().join("long.dbt")).unwrap();
    let payload = vec![b'x'; 600];
    let block = memo.put(&payload).unwrap();
    // ceil((600 + 2) / 512) = 2 blocks
    assert_eq!(memo.next_free(), block + 2);
    assert_eq!(memo.get(block).unwrap(), payload);
}

#[test]
fn db3_strips_trailing_whitespace() {
    let dir = tempdir().unwrap();
    let mut memo = Db3Memo::create(dir.path().join("ws.dbt")).unwrap();
    let block = memo.put(b"wisdom   \r\n").unwrap();
    assert_eq!(memo.get(block).unwrap(), b"wisdom");
}

#[test]
fn vfp_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.fpt");
    let mut memo = VfpMemo::create(&path, 1).unwrap();
    assert_eq!(memo.block_size(), 512);
    assert_eq!(memo.next_free(), 1);

    let block = memo.put(b"interior payload").unwrap();
    assert_eq!(block, 1);
    assert_eq!(memo.get(block).unwrap(), b"interior payload");

    drop(memo);
    let mut memo = VfpMemo::open(&path).unwrap();
    assert_eq!(memo.block_size(), 512);
    assert_eq!(memo.get(1).unwrap(), b"interior payload");
}

#[test]
fn vfp_allocation_counts_record_header() {
    let dir = tempdir().unwrap();
    let mut memo = VfpMemo::create(dir.path().join("alloc.fpt"), 1).unwrap();
    // 510 + 8 > 512 needs two blocks
    let block = memo.put(&vec![b'y'; 510]).unwrap();
    assert_eq!(memo.next_free(), block + 2);
}

#[test]
fn vfp_block_multiplier() {
    let dir = tempdir().unwrap();
    let memo = VfpMemo::create(dir.path().join("wide.fpt"), 2).unwrap();
    assert_eq!(memo.block_size(), 1024);
    assert!(VfpMemo::create(dir.path().join("bad.fpt"), 0).is_err());
    assert!(VfpMemo::create(dir.path().join("bad.fpt"), 33).is_err());
}

#[test]
fn memory_store() {
    let mut memo = MemoryMemo::new();
    let block = memo.put(b"volatile").unwrap();
    assert_eq!(block, 1);
    assert_eq!(memo.get(block).unwrap(), b"volatile");
    assert!(memo.get(42).is_err());
}
