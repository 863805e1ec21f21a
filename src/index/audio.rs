//! Audio side files
//!
//! Selected audio tracks are copied verbatim, one file per track, next to the
//! index. Files are only created once track selection has succeeded.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::demux::TrackDescriptor;
use crate::error::{IndexError, Result};
use crate::index::record::AudioTrackSummary;

/// `"<base> T<id hex>[ <layout>][ <kbps> kbps].audio"`
pub fn audio_file_name(base: &Path, track: &TrackDescriptor) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(" T{:x}", track.id));
    if let Some(layout) = &track.channel_layout {
        name.push(format!(" {}", layout));
    }
    if let Some(bit_rate) = track.bit_rate {
        name.push(format!(" {} kbps", bit_rate / 1000));
    }
    name.push(".audio");
    PathBuf::from(name)
}

/// An open side file for one audio track
pub struct AudioSink {
    track_id: i32,
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl AudioSink {
    pub fn create(track: &TrackDescriptor, path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(|source| IndexError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("Audio track {:x} -> {}", track.id, path.display());

        Ok(Self {
            track_id: track.id,
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .map_err(|source| IndexError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn finish(mut self) -> Result<AudioTrackSummary> {
        self.writer.flush().map_err(|source| IndexError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(AudioTrackSummary {
            track_id: self.track_id,
            path: self.path,
            bytes: self.bytes_written,
        })
    }
}

/// Side files keyed by track id
#[derive(Default)]
pub struct AudioSinks {
    sinks: HashMap<i32, AudioSink>,
}

impl AudioSinks {
    pub fn none() -> Self {
        Self::default()
    }

    /// Create one side file per track. On failure the files created so far
    /// are closed and the error is returned.
    pub fn open(base: &Path, tracks: &[&TrackDescriptor]) -> Result<Self> {
        let mut sinks = HashMap::with_capacity(tracks.len());
        for track in tracks {
            let sink = AudioSink::create(track, audio_file_name(base, track))?;
            sinks.insert(track.id, sink);
        }
        Ok(Self { sinks })
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Append a packet to its track's file. Returns `false` when the track
    /// was not selected.
    pub fn write(&mut self, track_id: i32, data: &[u8]) -> Result<bool> {
        match self.sinks.get_mut(&track_id) {
            Some(sink) => {
                sink.write(data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flush every file, ordered by track id.
    pub fn finish(self) -> Result<Vec<AudioTrackSummary>> {
        let mut sinks: Vec<_> = self.sinks.into_values().collect();
        sinks.sort_by_key(|s| s.track_id);
        sinks.into_iter().map(AudioSink::finish).collect()
    }
}
