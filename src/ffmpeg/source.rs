//! Packet source backed by libavformat

use std::ffi::{c_char, CStr};
use std::ptr;

use bytes::Bytes;
use ffmpeg_next as ffmpeg;

use super::io::CustomIo;
use crate::demux::{ContainerKind, DemuxedPacket, PacketSource, TrackCodec, TrackDescriptor};
use crate::error::{FfmpegError, IndexError, Result};
use crate::input::LogicalStream;

/// Demuxes program, transport and elementary streams read from a
/// [`LogicalStream`].
pub struct FfmpegSource {
    // Declared before `io`: the format context must be closed first.
    input: ffmpeg::format::context::Input,
    io: CustomIo,
    container: ContainerKind,
    tracks: Vec<TrackDescriptor>,
}

impl FfmpegSource {
    pub fn open(stream: LogicalStream) -> Result<Self> {
        let mut io = CustomIo::new(stream)?;

        let input = unsafe {
            let mut ctx = ffmpeg::ffi::avformat_alloc_context();
            if ctx.is_null() {
                return Err(FfmpegError::OpenInput(
                    "Failed to allocate format context".to_string(),
                )
                .into());
            }
            (*ctx).pb = io.as_mut_ptr();
            (*ctx).flags |= ffmpeg::ffi::AVFMT_FLAG_CUSTOM_IO;

            // On failure the context is freed by avformat_open_input.
            let ret = ffmpeg::ffi::avformat_open_input(
                &mut ctx,
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            );
            if ret < 0 {
                return Err(io_error_or(&mut io, || {
                    FfmpegError::OpenInput(ffmpeg::Error::from(ret).to_string())
                }));
            }

            let input = ffmpeg::format::context::Input::wrap(ctx);
            let ret = ffmpeg::ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if ret < 0 {
                drop(input);
                return Err(io_error_or(&mut io, || {
                    FfmpegError::FindStreamInfo(ffmpeg::Error::from(ret).to_string())
                }));
            }
            input
        };

        let format_name = input.format().name().to_string();
        let container = ContainerKind::from_format_name(&format_name)?;
        let mut tracks = describe_tracks(&input);
        for track in &mut tracks {
            track.pcr_pid = program_pcr_pid(&input, track.index);
        }

        tracing::debug!(
            "Opened {} ({}) with {} track(s)",
            container.name(),
            format_name,
            tracks.len()
        );

        Ok(Self {
            input,
            io,
            container,
            tracks,
        })
    }

    fn track_id(&self, stream_index: usize) -> Option<i32> {
        self.tracks
            .iter()
            .find(|t| t.index == stream_index)
            .map(|t| t.id)
    }
}

/// Prefer the I/O error behind a failed callback over FFmpeg's error code.
fn io_error_or(io: &mut CustomIo, fallback: impl FnOnce() -> FfmpegError) -> IndexError {
    io.stream_io_mut()
        .take_error()
        .unwrap_or_else(|| fallback().into())
}

fn describe_tracks(input: &ffmpeg::format::context::Input) -> Vec<TrackDescriptor> {
    let mut tracks = Vec::new();

    for stream in input.streams() {
        let params = stream.parameters();
        let codec = match params.id() {
            ffmpeg::codec::Id::MPEG1VIDEO => TrackCodec::Mpeg1Video,
            ffmpeg::codec::Id::MPEG2VIDEO => TrackCodec::Mpeg2Video,
            other => TrackCodec::Other(other.name().to_string()),
        };

        let track = match params.medium() {
            ffmpeg::media::Type::Video => {
                let mut track = TrackDescriptor::video(stream.index(), stream.id(), codec);
                unsafe {
                    let p = params.as_ptr();
                    track.width = Some((*p).width as u32);
                    track.height = Some((*p).height as u32);
                }
                track
            }
            ffmpeg::media::Type::Audio => {
                let mut track = TrackDescriptor::audio(stream.index(), stream.id(), codec);
                unsafe {
                    let p = params.as_ptr();
                    track.bit_rate = u64::try_from((*p).bit_rate).ok().filter(|&b| b > 0);
                    track.sample_rate = u32::try_from((*p).sample_rate).ok().filter(|&r| r > 0);
                    track.channel_layout = describe_layout(&(*p).ch_layout);
                }
                track
            }
            medium => {
                tracing::debug!("Ignoring stream {} (type={:?})", stream.index(), medium);
                continue;
            }
        };

        tracing::debug!(
            "Track {:x}: {:?} {}",
            track.id,
            track.kind,
            track.codec.name()
        );
        tracks.push(track);
    }

    tracks
}

/// PCR PID of the first program listing `stream_index`.
fn program_pcr_pid(input: &ffmpeg::format::context::Input, stream_index: usize) -> Option<i32> {
    unsafe {
        let ctx = input.as_ptr();
        if (*ctx).programs.is_null() {
            return None;
        }
        let programs = std::slice::from_raw_parts((*ctx).programs, (*ctx).nb_programs as usize);
        programs.iter().find_map(|&program| {
            if program.is_null() || (*program).stream_index.is_null() {
                return None;
            }
            let streams = std::slice::from_raw_parts(
                (*program).stream_index,
                (*program).nb_stream_indexes as usize,
            );
            streams
                .iter()
                .any(|&s| s as usize == stream_index)
                .then_some((*program).pcr_pid)
                .filter(|&pid| pid > 0)
        })
    }
}

fn describe_layout(layout: &ffmpeg::ffi::AVChannelLayout) -> Option<String> {
    if layout.nb_channels <= 0 {
        return None;
    }

    let mut buf = [0 as c_char; 128];
    let ret = unsafe { ffmpeg::ffi::av_channel_layout_describe(layout, buf.as_mut_ptr(), buf.len()) };
    if ret <= 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

impl PacketSource for FfmpegSource {
    fn container(&self) -> ContainerKind {
        self.container
    }

    fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    fn read_packet(&mut self) -> Result<Option<DemuxedPacket>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    return match self.io.stream_io_mut().take_error() {
                        Some(e) => Err(e),
                        None => Ok(None),
                    };
                }
                Err(ffmpeg::Error::InvalidData) => {
                    tracing::debug!("Skipping invalid packet near offset {}", self.position());
                    continue;
                }
                Err(e) => {
                    return Err(io_error_or(&mut self.io, || {
                        FfmpegError::ReadFrame(e.to_string())
                    }));
                }
            }

            let Some(track_id) = self.track_id(packet.stream()) else {
                continue;
            };

            return Ok(Some(DemuxedPacket {
                track_id,
                data: packet.data().map(Bytes::copy_from_slice).unwrap_or_default(),
                pos: u64::try_from(packet.position()).ok(),
            }));
        }
    }

    fn position(&self) -> u64 {
        self.io.stream_io().stream().position()
    }

    fn total_size(&self) -> u64 {
        self.io.stream_io().stream().total_size()
    }

    fn retain_tracks(&mut self, keep: &[usize]) {
        unsafe {
            let ctx = self.input.as_mut_ptr();
            if (*ctx).streams.is_null() {
                return;
            }
            let streams = std::slice::from_raw_parts((*ctx).streams, (*ctx).nb_streams as usize);
            for (index, &stream) in streams.iter().enumerate() {
                if !keep.contains(&index) {
                    (*stream).discard = ffmpeg::ffi::AVDiscard::AVDISCARD_ALL;
                }
            }
        }
        self.tracks.retain(|t| keep.contains(&t.index));
        tracing::debug!("Discarding all streams except {:?}", keep);
    }
}
