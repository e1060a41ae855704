//! Paged, immutable B+tree graph index.
//!
//! An index maps fixed-width [`Key`]s to an opaque value and a fixed number
//! of ref lists. The ancestry queries walk one ref list as a parent relation,
//! using each leaf's bounds to decide absence without extra page reads.

mod ancestry;
mod builder;
mod cache;
mod combined;
mod key;
mod node;
mod options;
pub mod page;
mod reader;
mod source;
mod stats;
mod tree;


pub use builder::IndexBuilder;
pub use combined::{Ancestry, CombinedIndex};
pub use key::{IndexEntry, Key, KeySet, ParentMap};
pub use node::{InternalNode, KeyBounds, LeafEntry, LeafNode, Node, Placement};
pub use options::{BuilderOptions, IndexOptions};
pub use source::{FilePageSource, MemPageSource, PageSource};
pub use stats::{IndexStats, IndexStatsSnapshot};
pub use tree::{GraphIndex, LeafAssignment};
