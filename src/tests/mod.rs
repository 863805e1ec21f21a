//! Integration testing module
//!
//! End-to-end tests for the indexer:
//! - Multi-file elementary streams
//! - Index re-reading
//! - Audio track selection failures
