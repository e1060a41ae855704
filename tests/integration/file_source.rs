#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::Write;

use refgraph::{
    index::{BuilderOptions, GraphIndex, IndexBuilder, IndexOptions, Key},
    types::{IndexError, Result},
};
use tempfile::tempdir;

const PAGE_SIZE: u32 = 1024;

fn rev(i: u32) -> Key {
    Key::from_slices([format!("rev-{i:04}").as_bytes()])
}

fn write_chain(path: &std::path::Path, n: u32) -> Result<u64> {
    let mut builder =
        IndexBuilder::with_options(1, 1, BuilderOptions::default().page_size(PAGE_SIZE));
    for i in 0..n {
        let parents = if i == 0 { vec![] } else { vec![rev(i - 1)] };
        builder.add_node(rev(i), format!("payload-{i}"), vec![parents])?;
    }
    builder.finish_to_file(path)
}

#[test]
fn file_backed_index_answers_queries() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("revisions.idx");
    let pages = write_chain(&path, 500)?;
    assert_eq!(std::fs::metadata(&path)?.len(), pages * PAGE_SIZE as u64);

    let index = GraphIndex::open_file(&path, PAGE_SIZE, IndexOptions::default())?;
    assert_eq!(index.key_count()?, 500);
    index.validate()?;

    let ancestry = index.find_ancestry([&rev(499)], 0)?;
    assert_eq!(ancestry.parent_map.len(), 500);

    let entries = index.iter_entries([&rev(42)])?;
    assert_eq!(&entries[0].value[..], b"payload-42");
    Ok(())
}

#[test]
fn partial_trailing_slot_is_corruption() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("revisions.idx");
    write_chain(&path, 50)?;
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(&[0u8; 100])?;
    drop(file);

    let err = GraphIndex::open_file(&path, PAGE_SIZE, IndexOptions::default())
        .err()
        .expect("open should fail");
    assert!(err.is_corruption());
    Ok(())
}

#[test]
fn flipped_payload_byte_fails_checksum() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("revisions.idx");
    write_chain(&path, 200)?;
    let mut bytes = std::fs::read(&path)?;
    // Inside the first leaf's payload: past page 0 and the 16-byte page header.
    let target = PAGE_SIZE as usize + 20;
    bytes[target] ^= 0xff;
    std::fs::write(&path, &bytes)?;

    let index = GraphIndex::open_file(&path, PAGE_SIZE, IndexOptions::default())?;
    assert!(matches!(index.validate(), Err(IndexError::Corruption(_))));
    Ok(())
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.idx");
    let err = GraphIndex::open_file(path, PAGE_SIZE, IndexOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, IndexError::Io(_)));
}
