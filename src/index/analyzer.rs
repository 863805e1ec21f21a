//! Video track analysis
//!
//! Consumes demuxed packets, finds start codes in the video payload and
//! builds the GOP/picture records of the index. Audio packets of selected
//! tracks are copied into their side files on the way.
//!
//! Video payload is appended to a rolling buffer so headers that straddle
//! packet boundaries are seen whole. Every buffered byte maps back to a
//! logical stream offset through the chunk list.

use crate::demux::{ContainerKind, PacketSource};
use crate::error::{IndexError, Result};
use crate::index::audio::AudioSinks;
use crate::index::hooks::Hooks;
use crate::index::record::{GopRecord, Picture, SequenceInfo, Stats, StreamIndex, DEFAULT_MATRIX};
use crate::mpeg::header::{GopHeader, PictureCodingExtension, PictureHeader, SequenceHeader};
use crate::mpeg::{self, classify, CodingType, Header, PictureStructure, HEADER_LOOKAHEAD};

/// Where the analyzer is in the video track. [`Analyzer::finish`] consumes
/// the analyzer, so there is no state after the last GOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing is recorded before the first sequence header
    AwaitingSequence,
    InGop,
}

/// Start of one packet's payload inside the rolling buffer
#[derive(Debug, Clone, Copy)]
struct Chunk {
    start: usize,
    offset: u64,
    packet_pos: Option<u64>,
}

struct OpenPicture {
    picture: Picture,
    has_extension: bool,
}

pub struct Analyzer<'h> {
    video_track: i32,
    container: ContainerKind,
    sinks: AudioSinks,
    hooks: Hooks<'h>,
    progress_interval: u64,
    last_progress: Option<u64>,

    state: State,
    buf: Vec<u8>,
    chunks: Vec<Chunk>,
    scan_pos: usize,
    next_offset: u64,

    sequence: Option<SequenceInfo>,
    sequence_count: usize,
    mpeg2: bool,
    progressive_sequence: bool,
    matrix: u8,
    pending_sequence_seek: Option<u64>,

    gops: Vec<GopRecord>,
    open: Option<OpenPicture>,
    first_field: Option<PictureStructure>,
    references_in_gop: usize,
    stats: Stats,
}

impl<'h> Analyzer<'h> {
    pub fn new(
        video_track: i32,
        container: ContainerKind,
        sinks: AudioSinks,
        hooks: Hooks<'h>,
        progress_interval: u64,
    ) -> Self {
        Self {
            video_track,
            container,
            sinks,
            hooks,
            progress_interval: progress_interval.max(1),
            last_progress: None,
            state: State::AwaitingSequence,
            buf: Vec::new(),
            chunks: Vec::new(),
            scan_pos: 0,
            next_offset: 0,
            sequence: None,
            sequence_count: 0,
            mpeg2: false,
            progressive_sequence: false,
            matrix: DEFAULT_MATRIX,
            pending_sequence_seek: None,
            gops: Vec::new(),
            open: None,
            first_field: None,
            references_in_gop: 0,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Counters for the pictures closed so far
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Drain `source` and build the index.
    pub fn run(mut self, source: &mut dyn PacketSource) -> Result<StreamIndex> {
        let total = source.total_size();

        while let Some(packet) = source.read_packet()? {
            if packet.track_id == self.video_track {
                self.push_video(&packet.data, packet.pos);
            } else {
                self.sinks.write(packet.track_id, &packet.data)?;
            }
            self.report_progress(source.position(), total);
        }

        self.hooks.progress.emit(total, total);
        self.finish()
    }

    fn report_progress(&mut self, position: u64, total: u64) {
        let due = match self.last_progress {
            None => true,
            Some(last) => position.saturating_sub(last) >= self.progress_interval,
        };
        if due {
            self.last_progress = Some(position);
            self.hooks.progress.emit(position, total);
        }
    }

    /// Append a video payload. `pos` is the logical offset of the container
    /// packet it came from.
    pub fn push_video(&mut self, data: &[u8], pos: Option<u64>) {
        let offset = pos.map_or(self.next_offset, |p| p.max(self.next_offset));
        self.chunks.push(Chunk {
            start: self.buf.len(),
            offset,
            packet_pos: pos,
        });
        self.buf.extend_from_slice(data);
        self.next_offset = offset + data.len() as u64;

        self.scan(false);
        self.compact();
    }

    /// End of input: close the last picture and flush the side files.
    pub fn finish(mut self) -> Result<StreamIndex> {
        self.scan(true);
        let end = self.next_offset;
        self.close_picture(end);

        let audio = self.sinks.finish()?;

        self.gops.retain(|g| !g.pictures.is_empty());
        let sequence = match self.sequence {
            Some(sequence) if self.stats.video_frames > 0 => sequence,
            _ => return Err(IndexError::NoPictures),
        };

        tracing::debug!(
            "Indexed {} GOPs, {} frames",
            self.gops.len(),
            self.stats.video_frames
        );

        Ok(StreamIndex {
            container: self.container,
            sequence,
            gops: self.gops,
            stats: self.stats,
            audio,
        })
    }

    fn scan(&mut self, at_end: bool) {
        loop {
            let Some(i) = mpeg::find_start_code(&self.buf, self.scan_pos) else {
                self.scan_pos = self.scan_pos.max(self.buf.len().saturating_sub(2));
                return;
            };

            let Some(&code) = self.buf.get(i + 3) else {
                // Prefix without its code byte; wait for more data.
                self.scan_pos = i;
                return;
            };

            let body = i + 4;
            let window_end = (body + HEADER_LOOKAHEAD).min(self.buf.len());
            let search_end = (window_end + 2).min(self.buf.len());
            let next = mpeg::find_start_code(&self.buf[..search_end], body);
            let complete = next.is_some() || self.buf.len() >= body + HEADER_LOOKAHEAD || at_end;
            if !complete {
                self.scan_pos = i;
                return;
            }

            let end = next.map_or(window_end, |n| n.min(window_end));
            let parsed = classify(code, &self.buf[body..end]);
            let offset = self.offset_at(i);
            let seek_point = match self.container {
                ContainerKind::Elementary => offset,
                _ => self.packet_pos_at(i).unwrap_or(offset),
            };

            self.scan_pos = body;
            match parsed {
                Ok(Some(header)) => self.handle(header, offset, seek_point),
                Ok(None) => {}
                Err(e) => self.truncated(code, offset, e),
            }
        }
    }

    /// Drop buffered bytes that no longer need scanning.
    fn compact(&mut self) {
        let keep_from = self.scan_pos.min(self.buf.len().saturating_sub(2));
        if keep_from == 0 {
            return;
        }

        self.buf.drain(..keep_from);
        self.scan_pos -= keep_from;

        let first = self
            .chunks
            .iter()
            .rposition(|c| c.start <= keep_from)
            .unwrap_or(0);
        self.chunks.drain(..first);
        for chunk in &mut self.chunks {
            if chunk.start >= keep_from {
                chunk.start -= keep_from;
            } else {
                chunk.offset += (keep_from - chunk.start) as u64;
                chunk.start = 0;
            }
        }
    }

    fn chunk_at(&self, i: usize) -> Option<&Chunk> {
        self.chunks.iter().rev().find(|c| c.start <= i)
    }

    fn offset_at(&self, i: usize) -> u64 {
        self.chunk_at(i)
            .map_or(self.next_offset, |c| c.offset + (i - c.start) as u64)
    }

    fn packet_pos_at(&self, i: usize) -> Option<u64> {
        self.chunk_at(i).and_then(|c| c.packet_pos)
    }

    fn warn(&mut self, message: &str) {
        tracing::debug!("{}", message);
        self.hooks.warning.emit(message);
    }

    fn truncated(&mut self, code: u8, offset: u64, error: crate::error::BitstreamError) {
        if self.state == State::AwaitingSequence {
            return;
        }
        let message = format!(
            "Ignoring header with start code {:02X} at offset {}: {}",
            code, offset, error
        );
        self.warn(&message);

        // A damaged picture, GOP or sequence header still ends the previous picture.
        if matches!(
            code,
            mpeg::header::PICTURE_START_CODE
                | mpeg::header::GROUP_START_CODE
                | mpeg::header::SEQUENCE_HEADER_CODE
        ) {
            self.close_picture(offset);
        }
    }

    fn handle(&mut self, header: Header, offset: u64, seek_point: u64) {
        if self.state == State::AwaitingSequence && !matches!(header, Header::Sequence(_)) {
            return;
        }

        match header {
            Header::Sequence(seq) => self.on_sequence(&seq, offset, seek_point),
            Header::SequenceExtension(ext) => {
                self.mpeg2 = true;
                self.progressive_sequence = ext.progressive_sequence;
                if self.sequence_count == 1 {
                    if let Some(info) = self.sequence.as_mut() {
                        info.apply_extension(&ext);
                    }
                }
            }
            Header::SequenceDisplayExtension(ext) => {
                if let Some(matrix) = ext.matrix_coefficients {
                    self.matrix = matrix;
                    if self.sequence_count == 1 {
                        if let Some(info) = self.sequence.as_mut() {
                            info.matrix_coefficients = Some(matrix);
                        }
                    }
                }
            }
            Header::Gop(gop) => self.on_gop(&gop, offset, seek_point),
            Header::Picture(pic) => self.on_picture(&pic, offset),
            Header::PictureCodingExtension(ext) => self.on_picture_coding_extension(&ext, offset),
            Header::SequenceEnd => self.close_picture(offset),
        }
    }

    fn on_sequence(&mut self, seq: &SequenceHeader, offset: u64, seek_point: u64) {
        self.close_picture(offset);

        if self.sequence.is_none() {
            tracing::debug!(
                "First sequence header at offset {}: {}x{}",
                offset,
                seq.horizontal_size,
                seq.vertical_size
            );
            self.sequence = Some(SequenceInfo::from_header(seq));
        }
        self.state = State::InGop;
        self.sequence_count += 1;
        // Extensions that follow say otherwise for MPEG-2.
        self.mpeg2 = false;
        self.progressive_sequence = false;
        self.pending_sequence_seek = Some(seek_point);
    }

    fn on_gop(&mut self, gop: &GopHeader, offset: u64, seek_point: u64) {
        self.close_picture(offset);

        let new_sequence = self.pending_sequence_seek.is_some();
        let seek_point = self.pending_sequence_seek.take().unwrap_or(seek_point);
        self.gops.push(GopRecord {
            id: self.gops.len(),
            start: offset,
            seek_point,
            closed: gop.closed_gop,
            broken_link: gop.broken_link,
            new_sequence,
            progressive_sequence: self.progressive_sequence,
            matrix: self.matrix,
            pictures: Vec::new(),
        });
        self.references_in_gop = 0;
        self.first_field = None;
    }

    fn on_picture(&mut self, header: &PictureHeader, offset: u64) {
        self.close_picture(offset);

        let Some(gop) = self.gops.last() else {
            let message = format!("Skipping picture outside of a GOP at offset {}", offset);
            self.warn(&message);
            return;
        };
        let gop_id = gop.id;

        let coding_type = match header.coding_type {
            Ok(coding_type) => coding_type,
            Err(code) => {
                let message = format!(
                    "Skipping picture with unsupported coding type {} at offset {}",
                    code, offset
                );
                self.warn(&message);
                return;
            }
        };

        self.open = Some(OpenPicture {
            picture: Picture {
                sequence: self.sequence_count.saturating_sub(1),
                gop: gop_id,
                start: offset,
                end: offset,
                temporal_reference: header.temporal_reference,
                coding_type,
                structure: PictureStructure::Frame,
                top_field_first: false,
                repeat_first_field: false,
                progressive_frame: !self.mpeg2,
                second_field: false,
                independent: false,
            },
            has_extension: false,
        });
    }

    fn on_picture_coding_extension(&mut self, ext: &PictureCodingExtension, offset: u64) {
        let first_field = self.first_field;
        let Some(open) = self.open.as_mut() else {
            let message = format!(
                "Ignoring picture coding extension without a picture at offset {}",
                offset
            );
            self.warn(&message);
            return;
        };

        let mut reserved = None;
        let structure = ext.picture_structure.unwrap_or_else(|code| {
            reserved = Some(code);
            PictureStructure::Frame
        });

        let picture = &mut open.picture;
        open.has_extension = true;
        picture.structure = structure;
        picture.repeat_first_field = ext.repeat_first_field;
        picture.progressive_frame = ext.progressive_frame;
        if structure.is_field() {
            picture.second_field = first_field.is_some_and(|f| f != structure);
            picture.top_field_first = structure == PictureStructure::TopField;
        } else {
            picture.top_field_first = ext.top_field_first;
        }

        if let Some(code) = reserved {
            let message = format!(
                "Reserved picture structure {} at offset {}, treating it as a frame",
                code, offset
            );
            self.warn(&message);
        }
    }

    fn close_picture(&mut self, end: u64) {
        let Some(open) = self.open.take() else {
            return;
        };
        let mut picture = open.picture;
        picture.end = end.max(picture.start);

        if !open.has_extension && self.mpeg2 {
            let message = format!(
                "Picture at offset {} has no picture coding extension, assuming a frame",
                picture.start
            );
            self.warn(&message);
        }

        self.first_field = match (picture.structure.is_field(), picture.second_field) {
            (true, false) => Some(picture.structure),
            _ => None,
        };

        let Some(gop) = self.gops.last_mut() else {
            return;
        };

        if picture.second_field {
            picture.independent = gop.frames().last().is_some_and(|p| p.independent);
        } else {
            if picture.coding_type != CodingType::B {
                self.references_in_gop += 1;
            }
            picture.independent = gop.closed
                || picture.coding_type != CodingType::B
                || self.references_in_gop >= 2;
            self.stats.record(&picture);
        }

        gop.pictures.push(picture);
    }
}
