//! Low-level building blocks for the index layers.

/// Varint encoding and slice cursors.
pub mod bytes;

/// Positioned file I/O.
pub mod io;
