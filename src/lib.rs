//! D2V indexer
//!
//! Builds a frame-accurate D2V index of the MPEG-1/2 video track of one or
//! more input files, read as a single logical stream, and optionally copies
//! audio tracks into raw side files during the same pass.

pub mod config;
pub mod config_file;
pub mod demux;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod index;
pub mod input;
pub mod mpeg;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{AudioSelection, IndexJob, OutputTarget, VideoSelection};
pub use error::{BitstreamError, IndexError, Result};
#[cfg(feature = "ffmpeg")]
pub use error::FfmpegError;
pub use index::{probe, scan, D2vIndex, Hooks, Stats};
pub use input::LogicalStream;
