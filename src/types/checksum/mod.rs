#![forbid(unsafe_code)]

/// CRC32 over a page's identity, node kind, flags, and payload.
///
/// Binding the page number into the checksum catches pages that are intact
/// but sit in the wrong slot.
pub fn page_crc32(page_no: u64, kind: u8, flags: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&page_no.to_be_bytes());
    hasher.update(&[kind, flags]);
    hasher.update(payload);
    hasher.finalize()
}
