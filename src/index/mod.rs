//! Stream indexing module
//!
//! This module builds the D2V index:
//! - Picture/GOP analysis of the selected video track
//! - Audio side files for selected audio tracks
//! - D2V serialization and parsing
//! - The pass driver tying sources, sinks and output together

pub mod analyzer;
pub mod audio;
pub mod d2v;
pub mod hooks;
pub mod record;
pub mod scanner;

pub use analyzer::Analyzer;
pub use d2v::{write_d2v, D2vIndex};
pub use hooks::{Hooks, ProgressHook, WarningHook};
pub use record::{GopRecord, Picture, SequenceInfo, Stats, StreamIndex};
pub use scanner::{probe, scan, scan_source, Probe};
