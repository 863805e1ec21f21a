//! FFmpeg module - container demuxing over the logical input stream
//!
//! This module handles:
//! - FFmpeg initialization
//! - Custom AVIOContext reading from a [`LogicalStream`](crate::input::LogicalStream)
//! - The [`FfmpegSource`] packet source

pub mod io;
pub mod source;

pub use ffmpeg_next as ffmpeg;
pub use source::FfmpegSource;

/// Initialize FFmpeg library
///
/// This should be called once at application startup. FFmpeg's own log
/// output is silenced; malformed packets are reported through the index pass.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    unsafe {
        ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_PANIC as i32);
    }

    tracing::debug!("FFmpeg initialized ({})", version_info());

    Ok(())
}

/// libavformat version as `major.minor.micro`
pub fn version_info() -> String {
    let version = unsafe { ffmpeg::ffi::avformat_version() };
    format!(
        "libavformat {}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff
    )
}
