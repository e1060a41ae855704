//! Refgraph: paged immutable graph indices with ancestry resolution.
//!
//! [`index::GraphIndex`] reads one index; [`index::CombinedIndex`] answers
//! ancestry queries across several, in precedence order.

#![warn(missing_docs)]

pub mod cli;
pub mod index;
pub mod primitives;
pub mod types;

pub use index::{Ancestry, CombinedIndex, GraphIndex, IndexBuilder, IndexOptions, Key};
pub use types::{IndexError, PageId, Result};
