#![forbid(unsafe_code)]
//! Identifiers, error type, and on-disk page constants shared by the index layers.

use std::fmt;

/// Checksums applied to page payloads.
pub mod checksum;

/// Identifier of a page inside a single index, counted from the root (page 0).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl PageId {
    /// The root page of every index.
    pub const ROOT: PageId = PageId(0);
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        PageId(value)
    }
}

/// Errors surfaced by index reads, ancestry queries, and index construction.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Failure reported by the underlying page source.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A page failed to parse as a well-formed node, or disagrees with the index header.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A ref-list number outside the index's declared ref-list count was requested.
    #[error("invalid ref list {requested}: index declares {available} ref lists")]
    InvalidRefList {
        /// The ref-list number the caller asked for.
        requested: usize,
        /// The number of ref lists each key carries in this index.
        available: usize,
    },
    /// A page id that the index layout does not contain.
    #[error("page {0} out of range")]
    PageOutOfRange(PageId),
    /// Malformed caller input with a static description.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Malformed caller input with details.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IndexError {
    /// Returns true when the error reports a structurally corrupt page.
    pub fn is_corruption(&self) -> bool {
        matches!(self, IndexError::Corruption(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

pub mod page {
    //! Shared on-disk page metadata used by the page codec and page sources.

    use core::convert::TryInto;

    use super::{IndexError, Result};

    /// Magic bytes at the start of every page.
    pub const PAGE_MAGIC: [u8; 4] = *b"RGIX";
    /// Default size of a page slot in bytes.
    pub const DEFAULT_PAGE_SIZE: u32 = 4096;
    /// Smallest page size the builder accepts.
    pub const MIN_PAGE_SIZE: u32 = 512;
    /// Length of the fixed page header.
    pub const PAGE_HDR_LEN: usize = 16;
    /// Flag set on page 0, whose payload begins with the index header.
    pub const FLAG_INDEX_HEADER: u8 = 0x01;

    pub mod header {
        //! Byte offsets for fixed header fields.
        use core::ops::Range;

        pub const MAGIC: Range<usize> = 0..4;
        pub const PAGE_KIND: usize = 4;
        pub const FLAGS: usize = 5;
        pub const RESERVED: Range<usize> = 6..8;
        pub const PAYLOAD_LEN: Range<usize> = 8..12;
        pub const CRC32: Range<usize> = 12..16;
    }

    /// Node kind stored in the page header.
    #[repr(u8)]
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub enum PageKind {
        /// Bottom row page holding entries.
        Leaf = 1,
        /// Upper row page holding separators.
        Internal = 2,
    }

    impl PageKind {
        /// Returns the on-disk byte for this kind.
        pub const fn as_u8(self) -> u8 {
            self as u8
        }

        /// Parses the on-disk byte.
        pub fn from_u8(value: u8) -> Result<Self> {
            match value {
                1 => Ok(Self::Leaf),
                2 => Ok(Self::Internal),
                _ => Err(IndexError::Corruption("unknown page kind")),
            }
        }
    }

    /// Decoded fixed header of a page.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct PageHeader {
        /// Node kind.
        pub kind: PageKind,
        /// Header flags.
        pub flags: u8,
        /// Number of payload bytes following the header.
        pub payload_len: u32,
        /// CRC32 over the page number and payload.
        pub crc32: u32,
    }

    impl PageHeader {
        /// Encodes the header into the first [`PAGE_HDR_LEN`] bytes of `dst`.
        pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
            if dst.len() < PAGE_HDR_LEN {
                return Err(IndexError::Invalid("page header buffer too small"));
            }
            dst[header::MAGIC].copy_from_slice(&PAGE_MAGIC);
            dst[header::PAGE_KIND] = self.kind.as_u8();
            dst[header::FLAGS] = self.flags;
            dst[header::RESERVED].fill(0);
            dst[header::PAYLOAD_LEN].copy_from_slice(&self.payload_len.to_be_bytes());
            dst[header::CRC32].copy_from_slice(&self.crc32.to_be_bytes());
            Ok(())
        }

        /// Decodes and sanity-checks a header from the start of `src`.
        pub fn decode(src: &[u8]) -> Result<Self> {
            if src.len() < PAGE_HDR_LEN {
                return Err(IndexError::Corruption("page shorter than header"));
            }
            if src[header::MAGIC] != PAGE_MAGIC {
                return Err(IndexError::Corruption("bad page magic"));
            }
            let kind = PageKind::from_u8(src[header::PAGE_KIND])?;
            let flags = src[header::FLAGS];
            let payload_len = u32::from_be_bytes(
                src[header::PAYLOAD_LEN]
                    .try_into()
                    .map_err(|_| IndexError::Corruption("payload length field"))?,
            );
            let crc32 = u32::from_be_bytes(
                src[header::CRC32]
                    .try_into()
                    .map_err(|_| IndexError::Corruption("crc field"))?,
            );
            if PAGE_HDR_LEN + payload_len as usize > src.len() {
                return Err(IndexError::Corruption("page payload exceeds page bytes"));
            }
            Ok(Self {
                kind,
                flags,
                payload_len,
                crc32,
            })
        }
    }
}
