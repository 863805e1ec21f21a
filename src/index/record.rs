//! Index records: pictures, GOPs, sequence parameters and statistics

use std::path::PathBuf;

use crate::demux::ContainerKind;
use crate::mpeg::header::{SequenceExtension, SequenceHeader};
use crate::mpeg::{CodingType, PictureStructure};

/// Matrix coefficients assumed when no sequence display extension says otherwise
pub const DEFAULT_MATRIX: u8 = 5;

/// One coded picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// Index of the sequence header this picture follows
    pub sequence: usize,
    /// Decode-order GOP id
    pub gop: usize,
    /// Logical byte range `[start, end)`
    pub start: u64,
    pub end: u64,
    pub temporal_reference: u16,
    pub coding_type: CodingType,
    pub structure: PictureStructure,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
    /// Second field of a field-coded frame
    pub second_field: bool,
    /// Decodable without data from the previous GOP
    pub independent: bool,
}

impl Picture {
    pub fn progressive(&self) -> bool {
        self.structure == PictureStructure::Frame && self.progressive_frame
    }

    /// Per-frame flag byte of a D2V data line.
    pub fn d2v_flags(&self) -> u8 {
        let mut flags = (self.coding_type as u8) << 4;
        if self.independent {
            flags |= 0x80;
        }
        if self.progressive_frame {
            flags |= 0x40;
        }
        if self.top_field_first {
            flags |= 0x02;
        }
        if self.repeat_first_field {
            flags |= 0x01;
        }
        flags
    }
}

/// Pictures sharing one GOP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GopRecord {
    pub id: usize,
    /// Logical offset of the GOP start code
    pub start: u64,
    /// Logical offset a reader seeks to before decoding this GOP
    pub seek_point: u64,
    pub closed: bool,
    pub broken_link: bool,
    /// A sequence header precedes this GOP
    pub new_sequence: bool,
    pub progressive_sequence: bool,
    pub matrix: u8,
    pub pictures: Vec<Picture>,
}

impl GopRecord {
    /// Pictures that start a frame (second fields folded into their first).
    pub fn frames(&self) -> impl Iterator<Item = &Picture> {
        self.pictures.iter().filter(|p| !p.second_field)
    }

    /// `info` word of a D2V data line.
    pub fn d2v_info(&self) -> u16 {
        let mut info = 0x800;
        if self.closed {
            info |= 0x400;
        }
        if self.progressive_sequence {
            info |= 0x200;
        }
        if self.new_sequence {
            info |= 0x100;
        }
        info
    }
}

/// Global stream parameters from the first sequence header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceInfo {
    pub mpeg2: bool,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio_code: u8,
    pub frame_rate_code: u8,
    pub frame_rate_extension_n: u8,
    pub frame_rate_extension_d: u8,
    pub progressive_sequence: bool,
    pub matrix_coefficients: Option<u8>,
}

impl SequenceInfo {
    pub fn from_header(seq: &SequenceHeader) -> Self {
        Self {
            mpeg2: false,
            width: u32::from(seq.horizontal_size),
            height: u32::from(seq.vertical_size),
            aspect_ratio_code: seq.aspect_ratio_information,
            frame_rate_code: seq.frame_rate_code,
            frame_rate_extension_n: 0,
            frame_rate_extension_d: 0,
            progressive_sequence: false,
            matrix_coefficients: None,
        }
    }

    pub fn apply_extension(&mut self, ext: &SequenceExtension) {
        self.mpeg2 = true;
        self.width |= u32::from(ext.horizontal_size_extension) << 12;
        self.height |= u32::from(ext.vertical_size_extension) << 12;
        self.frame_rate_extension_n = ext.frame_rate_extension_n;
        self.frame_rate_extension_d = ext.frame_rate_extension_d;
        self.progressive_sequence = ext.progressive_sequence;
    }

    /// Frame rate as `(numerator, denominator)`, `(0, 1)` for reserved codes.
    pub fn frame_rate(&self) -> (u32, u32) {
        let (num, den) = match self.frame_rate_code {
            1 => (24000, 1001),
            2 => (24, 1),
            3 => (25, 1),
            4 => (30000, 1001),
            5 => (30, 1),
            6 => (50, 1),
            7 => (60000, 1001),
            8 => (60, 1),
            _ => return (0, 1),
        };
        (
            num * (u32::from(self.frame_rate_extension_n) + 1),
            den * (u32::from(self.frame_rate_extension_d) + 1),
        )
    }

    /// Display aspect ratio (MPEG-2) or pel aspect ratio (MPEG-1).
    pub fn aspect_ratio(&self) -> String {
        if self.mpeg2 {
            return match self.aspect_ratio_code {
                1 => "1:1",
                2 => "4:3",
                3 => "16:9",
                4 => "2.21:1",
                _ => "0:0",
            }
            .to_string();
        }

        const PEL_ASPECT: [f32; 14] = [
            1.0000, 0.6735, 0.7031, 0.7615, 0.8055, 0.8437, 0.8935, 0.9157, 0.9815, 1.0255,
            1.0695, 1.0950, 1.1575, 1.2015,
        ];
        let ratio = (self.aspect_ratio_code as usize)
            .checked_sub(1)
            .and_then(|i| PEL_ASPECT.get(i))
            .copied()
            .unwrap_or(1.0);
        format!("{:.4}", ratio)
    }

    pub fn matrix(&self) -> u8 {
        self.matrix_coefficients.unwrap_or(DEFAULT_MATRIX)
    }
}

/// Running counters over completed frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub video_frames: u64,
    pub progressive_frames: u64,
    pub tff_frames: u64,
    pub rff_frames: u64,
}

impl Stats {
    pub fn record(&mut self, picture: &Picture) {
        self.video_frames += 1;
        if picture.progressive() {
            self.progressive_frames += 1;
        }
        if picture.top_field_first {
            self.tff_frames += 1;
        }
        if picture.repeat_first_field {
            self.rff_frames += 1;
        }
    }

    pub fn non_progressive_frames(&self) -> u64 {
        self.video_frames - self.progressive_frames
    }
}

/// Bytes copied into one audio side file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackSummary {
    pub track_id: i32,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Everything a completed pass produced
#[derive(Debug, Clone)]
pub struct StreamIndex {
    pub container: ContainerKind,
    pub sequence: SequenceInfo,
    pub gops: Vec<GopRecord>,
    pub stats: Stats,
    pub audio: Vec<AudioTrackSummary>,
}
