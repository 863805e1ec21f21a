//! Input handling
//!
//! All input files are read through a single [`LogicalStream`] so the
//! demuxer sees one contiguous byte range, whatever the file split.

pub mod logical;

pub use logical::{LogicalStream, SpanInfo, SpanLayout, Whence};
