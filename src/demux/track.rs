//! Track descriptors and track selection

use std::collections::BTreeSet;

use crate::config::{AudioSelection, VideoSelection};
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackCodec {
    Mpeg1Video,
    Mpeg2Video,
    Other(String),
}

impl TrackCodec {
    pub fn is_supported_video(&self) -> bool {
        matches!(self, Self::Mpeg1Video | Self::Mpeg2Video)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Mpeg1Video => "MPEG-1 video",
            Self::Mpeg2Video => "MPEG-2 video",
            Self::Other(name) => name,
        }
    }
}

/// One elementary track as enumerated by the demuxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// Position in the demuxer's stream list
    pub index: usize,
    /// Container-level id (PES stream id, TS PID, ...)
    pub id: i32,
    pub kind: TrackKind,
    pub codec: TrackCodec,
    pub bit_rate: Option<u64>,
    pub channel_layout: Option<String>,
    pub sample_rate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// PCR PID of the transport stream program carrying this track
    pub pcr_pid: Option<i32>,
}

impl TrackDescriptor {
    pub fn video(index: usize, id: i32, codec: TrackCodec) -> Self {
        Self {
            index,
            id,
            kind: TrackKind::Video,
            codec,
            bit_rate: None,
            channel_layout: None,
            sample_rate: None,
            width: None,
            height: None,
            pcr_pid: None,
        }
    }

    pub fn audio(index: usize, id: i32, codec: TrackCodec) -> Self {
        Self {
            kind: TrackKind::Audio,
            ..Self::video(index, id, codec)
        }
    }
}

/// Pick the video track to index.
pub fn select_video<'a>(
    tracks: &'a [TrackDescriptor],
    selection: &VideoSelection,
) -> Result<&'a TrackDescriptor> {
    let mut videos = tracks.iter().filter(|t| t.kind == TrackKind::Video);

    match selection {
        VideoSelection::First => videos.next().ok_or(IndexError::NoVideoTrack),
        VideoSelection::Id(id) => videos
            .find(|t| t.id == *id)
            .ok_or(IndexError::VideoTrackNotFound(*id)),
    }
}

/// Pick the audio tracks to demux.
///
/// Every requested id must exist; the error lists all that don't.
pub fn select_audio<'a>(
    tracks: &'a [TrackDescriptor],
    selection: &AudioSelection,
) -> Result<Vec<&'a TrackDescriptor>> {
    let audio = tracks.iter().filter(|t| t.kind == TrackKind::Audio);

    match selection {
        AudioSelection::None => Ok(Vec::new()),
        AudioSelection::All => {
            let selected: Vec<_> = audio.collect();
            if selected.is_empty() {
                return Err(IndexError::NoAudioTracks);
            }
            Ok(selected)
        }
        AudioSelection::Ids(ids) => {
            let wanted: BTreeSet<i32> = ids.iter().copied().collect();
            let selected: Vec<_> = audio.filter(|t| wanted.contains(&t.id)).collect();

            let missing: Vec<i32> = wanted
                .iter()
                .copied()
                .filter(|id| !selected.iter().any(|t| t.id == *id))
                .collect();
            if !missing.is_empty() {
                return Err(IndexError::AudioTracksNotFound(missing));
            }
            Ok(selected)
        }
    }
}
