//! Custom AVIOContext reading from a logical multi-file stream
//!
//! FFmpeg pulls bytes through `read_packet` and repositions through
//! `seek_packet`; both forward to the [`LogicalStream`]. The first I/O error
//! is kept so the caller can report the real cause instead of FFmpeg's
//! generic error code.
//!
//! Single-threaded use only: the context and its stream live on the thread
//! that drives the demuxer.

use ffmpeg_next as ffmpeg;
use std::ffi::c_void;

use crate::error::{FfmpegError, IndexError};
use crate::input::{LogicalStream, Whence};

/// Size of the buffer FFmpeg reads into
pub const AVIO_BUFFER_SIZE: usize = 64 * 1024;

const SEEK_SET: i32 = 0;
const SEEK_CUR: i32 = 1;
const SEEK_END: i32 = 2;
const AVSEEK_SIZE: i32 = 0x10000;
const AVSEEK_FORCE: i32 = 0x20000;

/// The opaque state behind the callbacks.
pub struct StreamIo {
    stream: LogicalStream,
    error: Option<IndexError>,
}

impl StreamIo {
    pub fn new(stream: LogicalStream) -> Self {
        Self {
            stream,
            error: None,
        }
    }

    pub fn stream(&self) -> &LogicalStream {
        &self.stream
    }

    /// The I/O error that made a callback fail, if any.
    pub fn take_error(&mut self) -> Option<IndexError> {
        self.error.take()
    }

    fn read(&mut self, buf: &mut [u8]) -> i32 {
        match self.stream.read(buf) {
            Ok(0) => ffmpeg::ffi::AVERROR_EOF,
            Ok(n) => n as i32,
            Err(e) => {
                self.error = Some(e);
                ffmpeg::ffi::AVERROR_EXTERNAL
            }
        }
    }

    fn seek(&mut self, offset: i64, whence: i32) -> i64 {
        let whence = match whence & !AVSEEK_FORCE {
            AVSEEK_SIZE => Whence::Size,
            SEEK_SET => Whence::Start,
            SEEK_CUR => Whence::Current,
            SEEK_END => Whence::End,
            _ => return -1,
        };
        match self.stream.seek(offset, whence) {
            Ok(pos) => pos as i64,
            Err(e) => {
                self.error = Some(e);
                i64::from(ffmpeg::ffi::AVERROR_EXTERNAL)
            }
        }
    }
}

// C-compatible callbacks for FFmpeg

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: i32) -> i32 {
    let io = &mut *(opaque as *mut StreamIo);
    if buf_size <= 0 {
        return 0;
    }
    let slice = std::slice::from_raw_parts_mut(buf, buf_size as usize);
    io.read(slice)
}

unsafe extern "C" fn seek_packet(opaque: *mut c_void, offset: i64, whence: i32) -> i64 {
    let io = &mut *(opaque as *mut StreamIo);
    io.seek(offset, whence)
}

/// An AVIOContext together with the [`StreamIo`] it reads from.
///
/// Must outlive any format context it is attached to.
pub struct CustomIo {
    ctx: *mut ffmpeg::ffi::AVIOContext,
    io: *mut StreamIo,
}

impl CustomIo {
    pub fn new(stream: LogicalStream) -> Result<Self, FfmpegError> {
        unsafe {
            // Box the state to get a stable pointer
            let io = Box::into_raw(Box::new(StreamIo::new(stream)));

            let buffer = ffmpeg::ffi::av_malloc(AVIO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(io));
                return Err(FfmpegError::InitFailed(
                    "Failed to allocate AVIO buffer".to_string(),
                ));
            }

            let ctx = ffmpeg::ffi::avio_alloc_context(
                buffer,
                AVIO_BUFFER_SIZE as i32,
                0,
                io as *mut c_void,
                Some(read_packet),
                None,
                Some(seek_packet),
            );
            if ctx.is_null() {
                ffmpeg::ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(io));
                return Err(FfmpegError::InitFailed(
                    "Failed to allocate AVIO context".to_string(),
                ));
            }

            Ok(Self { ctx, io })
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffmpeg::ffi::AVIOContext {
        self.ctx
    }

    pub fn stream_io(&self) -> &StreamIo {
        unsafe { &*self.io }
    }

    pub fn stream_io_mut(&mut self) -> &mut StreamIo {
        unsafe { &mut *self.io }
    }
}

impl Drop for CustomIo {
    fn drop(&mut self) {
        unsafe {
            // FFmpeg may have replaced the buffer; free whatever it holds now.
            ffmpeg::ffi::av_freep(&mut (*self.ctx).buffer as *mut *mut u8 as *mut c_void);
            ffmpeg::ffi::avio_context_free(&mut self.ctx);
            drop(Box::from_raw(self.io));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stream_io(dir: &TempDir) -> StreamIo {
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, [1u8; 10]).unwrap();
        std::fs::write(&b, [2u8; 6]).unwrap();
        StreamIo::new(LogicalStream::open(&[a, b]).unwrap())
    }

    #[test]
    fn test_read_reports_eof() {
        let dir = TempDir::new().unwrap();
        let mut io = stream_io(&dir);
        let mut buf = [0u8; 32];
        assert_eq!(io.read(&mut buf), 16);
        assert_eq!(&buf[8..12], &[1, 1, 2, 2]);
        assert_eq!(io.read(&mut buf), ffmpeg::ffi::AVERROR_EOF);
    }

    #[test]
    fn test_seek_modes() {
        let dir = TempDir::new().unwrap();
        let mut io = stream_io(&dir);
        assert_eq!(io.seek(0, AVSEEK_SIZE), 16);
        assert_eq!(io.seek(12, SEEK_SET | AVSEEK_FORCE), 12);
        assert_eq!(io.seek(-2, SEEK_CUR), 10);
        assert_eq!(io.seek(-1, SEEK_END), 15);
        assert_eq!(io.seek(100, SEEK_SET), 16);
        assert_eq!(io.seek(0, 7), -1);
        assert!(io.take_error().is_none());
    }

    #[test]
    fn test_seek_error_is_kept() {
        let dir = TempDir::new().unwrap();
        let mut io = stream_io(&dir);
        assert_eq!(io.seek(-1, SEEK_SET), i64::from(ffmpeg::ffi::AVERROR_EXTERNAL));
        assert!(io.take_error().is_some());
        assert!(io.take_error().is_none());
    }
}
