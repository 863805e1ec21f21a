//! Container-free source for raw MPEG video elementary streams

use bytes::Bytes;

use super::{ContainerKind, DemuxedPacket, PacketSource, TrackCodec, TrackDescriptor};
use crate::error::Result;
use crate::input::{LogicalStream, Whence};
use crate::mpeg::{self, header};

/// Default packet size handed to the analyzer
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Track id reported for the single video track
pub const ELEMENTARY_TRACK_ID: i32 = 0;

/// Slices a logical stream into fixed-size packets with exact offsets.
pub struct ElementarySource {
    stream: LogicalStream,
    tracks: Vec<TrackDescriptor>,
    chunk_size: usize,
}

impl ElementarySource {
    pub fn new(stream: LogicalStream) -> Result<Self> {
        Self::with_chunk_size(stream, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(mut stream: LogicalStream, chunk_size: usize) -> Result<Self> {
        let codec = sniff_codec(&mut stream)?;
        tracing::debug!("Elementary stream codec: {}", codec.name());

        Ok(Self {
            stream,
            tracks: vec![TrackDescriptor::video(0, ELEMENTARY_TRACK_ID, codec)],
            chunk_size: chunk_size.max(1),
        })
    }
}

/// Look at the start of the stream to tell MPEG-1 from MPEG-2.
///
/// A sequence header followed by a sequence extension is MPEG-2; a sequence
/// header alone is MPEG-1. The cursor is rewound afterwards.
fn sniff_codec(stream: &mut LogicalStream) -> Result<TrackCodec> {
    let mut probe = vec![0u8; DEFAULT_CHUNK_SIZE];
    let n = stream.read(&mut probe)?;
    stream.seek(0, Whence::Start)?;
    probe.truncate(n);

    let mut seen_sequence = false;
    let mut pos = 0;
    while let Some(i) = mpeg::find_start_code(&probe, pos) {
        let code = probe.get(i + 3).copied();
        match code {
            Some(header::SEQUENCE_HEADER_CODE) => seen_sequence = true,
            Some(header::EXTENSION_START_CODE) if seen_sequence => {
                return Ok(TrackCodec::Mpeg2Video);
            }
            Some(header::PICTURE_START_CODE) if seen_sequence => {
                return Ok(TrackCodec::Mpeg1Video);
            }
            _ => {}
        }
        pos = i + 3;
    }

    Ok(if seen_sequence {
        TrackCodec::Mpeg1Video
    } else {
        TrackCodec::Other("unknown".to_string())
    })
}

impl PacketSource for ElementarySource {
    fn container(&self) -> ContainerKind {
        ContainerKind::Elementary
    }

    fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    fn read_packet(&mut self) -> Result<Option<DemuxedPacket>> {
        let pos = self.stream.position();
        let mut buf = vec![0u8; self.chunk_size];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        Ok(Some(DemuxedPacket {
            track_id: ELEMENTARY_TRACK_ID,
            data: Bytes::from(buf),
            pos: Some(pos),
        }))
    }

    fn position(&self) -> u64 {
        self.stream.position()
    }

    fn total_size(&self) -> u64 {
        self.stream.total_size()
    }
}
