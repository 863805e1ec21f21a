//! Demuxing seam
//!
//! The analyzer pulls packets through [`PacketSource`]. The FFmpeg-backed
//! source handles program and transport streams; [`ElementarySource`]
//! handles raw video elementary streams without any container library.

pub mod elementary;
pub mod track;

use bytes::Bytes;

use crate::error::{IndexError, Result};

pub use elementary::ElementarySource;
pub use track::{select_audio, select_video, TrackCodec, TrackDescriptor, TrackKind};

/// Container types that can be indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Raw MPEG-1/2 video elementary stream
    Elementary,
    /// MPEG program stream (including VOB)
    Program,
    /// MPEG transport stream
    Transport,
}

impl ContainerKind {
    /// Map a demuxer short format name.
    pub fn from_format_name(name: &str) -> Result<Self> {
        match name {
            "mpegvideo" | "mpeg1video" | "mpeg2video" => Ok(Self::Elementary),
            "mpeg" | "vob" | "mpegps" => Ok(Self::Program),
            "mpegts" | "mpegtsraw" => Ok(Self::Transport),
            other => Err(IndexError::UnsupportedContainer(other.to_string())),
        }
    }

    /// `Stream_Type` value of the index file.
    pub fn stream_type(self) -> u8 {
        match self {
            Self::Elementary => 0,
            Self::Program => 1,
            Self::Transport => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Elementary => "MPEG video elementary stream",
            Self::Program => "MPEG program stream",
            Self::Transport => "MPEG transport stream",
        }
    }
}

/// One demuxed packet.
#[derive(Debug, Clone)]
pub struct DemuxedPacket {
    /// Container-level track id, see [`TrackDescriptor::id`]
    pub track_id: i32,
    pub data: Bytes,
    /// Logical stream offset of the container packet, when known
    pub pos: Option<u64>,
}

/// A sequential packet reader over a logical stream.
pub trait PacketSource {
    fn container(&self) -> ContainerKind;

    fn tracks(&self) -> &[TrackDescriptor];

    /// Next packet in arrival order, `None` at end of input.
    fn read_packet(&mut self) -> Result<Option<DemuxedPacket>>;

    /// Current read position in the logical stream.
    fn position(&self) -> u64;

    fn total_size(&self) -> u64;

    /// Stop delivering packets for every track whose index is not in `keep`.
    fn retain_tracks(&mut self, _keep: &[usize]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_from_format_name() {
        assert_eq!(
            ContainerKind::from_format_name("mpeg").unwrap(),
            ContainerKind::Program
        );
        assert_eq!(
            ContainerKind::from_format_name("mpegts").unwrap().stream_type(),
            2
        );
        assert_eq!(
            ContainerKind::from_format_name("mpegvideo").unwrap().stream_type(),
            0
        );
        assert!(matches!(
            ContainerKind::from_format_name("matroska,webm"),
            Err(IndexError::UnsupportedContainer(name)) if name == "matroska,webm"
        ));
    }
}
