use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the indexer
#[derive(Error, Debug)]
pub enum IndexError {
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("Failed to open input file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No files given. Try '--help'.")]
    NoInputFiles,

    #[error("Unsupported container type '{0}'.")]
    UnsupportedContainer(String),

    #[error("Couldn't find video track with id {0:x}.")]
    VideoTrackNotFound(i32),

    #[error("Couldn't find any video tracks.")]
    NoVideoTrack,

    #[error("Couldn't find audio track(s) with id {}.", format_ids(.0))]
    AudioTracksNotFound(Vec<i32>),

    #[error("Couldn't find any audio tracks.")]
    NoAudioTracks,

    #[error("Unsupported video codec: {0}")]
    UnsupportedCodec(String),

    #[error("No pictures found in the video track")]
    NoPictures,

    #[error("Malformed index file, {0}")]
    MalformedIndex(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_ids(ids: &[i32]) -> String {
    ids.iter()
        .map(|id| format!("{:x}", id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// FFmpeg-specific errors
#[cfg(feature = "ffmpeg")]
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input: {0}")]
    OpenInput(String),

    #[error("Failed to find stream info: {0}")]
    FindStreamInfo(String),

    #[error("Failed to read frame: {0}")]
    ReadFrame(String),
}

/// Header parsing failures. These never abort a pass.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("header truncated: needed {needed} bits, {available} available")]
    Truncated { needed: usize, available: usize },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_audio_ids_are_listed_in_hex() {
        let err = IndexError::AudioTracksNotFound(vec![0x80, 0x1c0]);
        assert_eq!(
            err.to_string(),
            "Couldn't find audio track(s) with id 80, 1c0."
        );
    }

    #[test]
    fn test_open_error_names_path() {
        let err = IndexError::Open {
            path: PathBuf::from("/media/a.vob"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("Failed to open input file '/media/a.vob'"));
    }
}
