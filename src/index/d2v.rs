//! D2V index files (`DGIndexProjectFile16`)
//!
//! Writing renders a [`StreamIndex`] for a given input layout; parsing reads
//! an index back far enough to re-open the same logical stream and walk its
//! GOP lines.

use std::io::{self, Write};
use std::path::PathBuf;

use crate::demux::ContainerKind;
use crate::error::{IndexError, Result};
use crate::index::record::StreamIndex;
use crate::input::{LogicalStream, SpanLayout};

pub const D2V_VERSION: u32 = 16;
const MAGIC: &str = "DGIndexProjectFile";
const TRANSPORT_PACKET_SIZE: u32 = 188;

/// PIDs written for transport stream inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPids {
    pub video: i32,
    pub audio: i32,
    pub pcr: i32,
}

/// Render `index` in D2V form.
pub fn write_d2v<W: Write>(
    out: &mut W,
    layout: &SpanLayout,
    index: &StreamIndex,
    pids: Option<TransportPids>,
) -> io::Result<()> {
    writeln!(out, "{}{}", MAGIC, D2V_VERSION)?;
    writeln!(out, "{}", layout.spans().len())?;
    for span in layout.spans() {
        writeln!(out, "{}", span.path.display())?;
    }
    writeln!(out)?;

    let seq = &index.sequence;
    writeln!(out, "Stream_Type={}", index.container.stream_type())?;
    if index.container == ContainerKind::Transport {
        let pids = pids.unwrap_or(TransportPids {
            video: 0,
            audio: 0,
            pcr: 0,
        });
        writeln!(
            out,
            "MPEG2_Transport_PID={:x},{:x},{:x}",
            pids.video, pids.audio, pids.pcr
        )?;
        writeln!(out, "Transport_Packet_Size={}", TRANSPORT_PACKET_SIZE)?;
    }
    writeln!(out, "MPEG_Type={}", if seq.mpeg2 { 2 } else { 1 })?;
    writeln!(out, "iDCT_Algorithm=6")?;
    writeln!(out, "YUVRGB_Scale=1")?;
    writeln!(out, "Luminance_Filter=0,0")?;
    writeln!(out, "Clipping=0,0,0,0")?;
    writeln!(out, "Aspect_Ratio={}", seq.aspect_ratio())?;
    writeln!(out, "Picture_Size={}x{}", seq.width, seq.height)?;
    writeln!(out, "Field_Operation=0")?;
    let (num, den) = seq.frame_rate();
    writeln!(
        out,
        "Frame_Rate={} ({}/{})",
        u64::from(num) * 1000 / u64::from(den),
        num,
        den
    )?;
    writeln!(out, "Location=0,0,0,0")?;
    writeln!(out)?;

    let last = index.gops.len().saturating_sub(1);
    for (n, gop) in index.gops.iter().enumerate() {
        let (file, position) = locate(layout, gop.seek_point);
        write!(
            out,
            "{:x} {} {} {} 0 0 0",
            gop.d2v_info(),
            gop.matrix,
            file,
            position
        )?;
        for frame in gop.frames() {
            write!(out, " {:02x}", frame.d2v_flags())?;
        }
        if n == last {
            write!(out, " ff")?;
        }
        writeln!(out)?;
    }
    writeln!(out)?;

    let frames = index.stats.video_frames.max(1) as f64;
    let film = index.stats.rff_frames as f64 * 100.0 / frames;
    if film >= 50.0 {
        writeln!(out, "FINISHED {:6.2}% FILM", film)?;
    } else {
        writeln!(out, "FINISHED {:6.2}% VIDEO", 100.0 - film)?;
    }

    Ok(())
}

/// `(file index, offset in file)`; end of stream maps to the end of the last file.
fn locate(layout: &SpanLayout, offset: u64) -> (usize, u64) {
    layout.resolve(offset).unwrap_or_else(|| {
        let last = layout.spans().len().saturating_sub(1);
        let size = layout.spans().last().map_or(0, |s| s.size);
        (last, size)
    })
}

/// One GOP line of a parsed index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D2vGopLine {
    pub info: u16,
    pub matrix: u8,
    pub file: usize,
    pub position: u64,
    pub flags: Vec<u8>,
}

impl D2vGopLine {
    pub fn closed(&self) -> bool {
        self.info & 0x400 != 0
    }

    pub fn new_sequence(&self) -> bool {
        self.info & 0x100 != 0
    }
}

/// A parsed D2V file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D2vIndex {
    pub version: u32,
    pub files: Vec<PathBuf>,
    pub settings: Vec<(String, String)>,
    pub gops: Vec<D2vGopLine>,
    /// Text after `FINISHED`, if the trailer is present
    pub finished: Option<String>,
}

impl D2vIndex {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().map(|(n, l)| (n + 1, l));

        let (_, magic) = lines
            .next()
            .ok_or_else(|| malformed(1, "empty index"))?;
        let version = magic
            .strip_prefix(MAGIC)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .ok_or_else(|| malformed(1, "not a D2V index"))?;

        let (n, count) = lines.next().ok_or_else(|| malformed(2, "missing file count"))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| malformed(n, "invalid file count"))?;
        let mut files = Vec::with_capacity(count);
        for _ in 0..count {
            let (n, path) = lines.next().ok_or_else(|| malformed(n, "missing file path"))?;
            if path.is_empty() {
                return Err(malformed(n, "missing file path"));
            }
            files.push(PathBuf::from(path));
        }
        expect_blank(&mut lines)?;

        let mut settings = Vec::new();
        for (n, line) in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(n, "expected key=value"))?;
            settings.push((key.to_string(), value.to_string()));
        }

        let mut gops = Vec::new();
        for (n, line) in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            gops.push(parse_gop_line(n, line)?);
        }

        let finished = lines
            .find_map(|(_, l)| l.strip_prefix("FINISHED").map(|rest| rest.trim().to_string()));

        Ok(Self {
            version,
            files,
            settings,
            gops,
            finished,
        })
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Total frame entries over all GOP lines.
    pub fn frame_count(&self) -> usize {
        self.gops.iter().map(|g| g.flags.len()).sum()
    }

    /// Open the listed files, in order, as one logical stream.
    pub fn reopen(&self) -> Result<LogicalStream> {
        LogicalStream::open(&self.files)
    }
}

fn malformed(line: usize, what: &str) -> IndexError {
    IndexError::MalformedIndex(format!("line {}: {}", line, what))
}

fn expect_blank<'a>(lines: &mut impl Iterator<Item = (usize, &'a str)>) -> Result<()> {
    match lines.next() {
        Some((_, "")) => Ok(()),
        Some((n, _)) => Err(malformed(n, "expected a blank line")),
        None => Err(malformed(0, "unexpected end of index")),
    }
}

fn parse_gop_line(n: usize, line: &str) -> Result<D2vGopLine> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return Err(malformed(n, "short GOP line"));
    }

    let info = u16::from_str_radix(fields[0], 16).map_err(|_| malformed(n, "invalid info"))?;
    let matrix = fields[1]
        .parse()
        .map_err(|_| malformed(n, "invalid matrix"))?;
    let file = fields[2]
        .parse()
        .map_err(|_| malformed(n, "invalid file index"))?;
    let position = fields[3]
        .parse()
        .map_err(|_| malformed(n, "invalid position"))?;

    let mut flags = Vec::with_capacity(fields.len() - 7);
    for field in &fields[7..] {
        if *field == "ff" {
            break;
        }
        flags.push(u8::from_str_radix(field, 16).map_err(|_| malformed(n, "invalid frame flags"))?);
    }

    Ok(D2vGopLine {
        info,
        matrix,
        file,
        position,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::analyzer::Analyzer;
    use crate::index::audio::AudioSinks;
    use crate::index::hooks::Hooks;
    use crate::input::SpanInfo;
    use crate::tests::fixtures::{two_gop_stream, EsBuilder, PictureSpec};

    fn index_of(data: &[u8], container: ContainerKind) -> StreamIndex {
        let mut analyzer = Analyzer::new(0, container, AudioSinks::none(), Hooks::silent(), 1);
        analyzer.push_video(data, Some(0));
        analyzer.finish().unwrap()
    }

    fn render(layout: &SpanLayout, index: &StreamIndex, pids: Option<TransportPids>) -> String {
        let mut out = Vec::new();
        write_d2v(&mut out, layout, index, pids).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn two_file_layout(total: u64) -> SpanLayout {
        SpanLayout::new(vec![
            SpanInfo {
                path: PathBuf::from("/media/VTS_01_1.VOB"),
                size: 40,
            },
            SpanInfo {
                path: PathBuf::from("/media/VTS_01_2.VOB"),
                size: total - 40,
            },
        ])
    }

    #[test]
    fn test_write_elementary_index() {
        let data = two_gop_stream();
        let index = index_of(&data, ContainerKind::Elementary);
        let layout = two_file_layout(data.len() as u64);
        let text = render(&layout, &index, None);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "DGIndexProjectFile16");
        assert_eq!(lines[1], "2");
        assert_eq!(lines[2], "/media/VTS_01_1.VOB");
        assert_eq!(lines[3], "/media/VTS_01_2.VOB");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "Stream_Type=0");
        assert_eq!(lines[6], "MPEG_Type=2");
        assert!(lines.contains(&"Aspect_Ratio=16:9"));
        assert!(lines.contains(&"Picture_Size=720x480"));
        assert!(lines.contains(&"Frame_Rate=29970 (30000/1001)"));
        assert!(!text.contains("MPEG2_Transport_PID"));

        // First GOP: closed, new sequence, seek point at offset 0 of file 0.
        assert_eq!(lines[16], "");
        assert_eq!(lines[17], "d00 5 0 0 0 0 0 92 b2 a2");

        // Second GOP is open and lands in the second file.
        let second = &index.gops[1];
        let expected = format!("800 5 1 {} 0 0 0 d0 70 a2 ff", second.seek_point - 40);
        assert_eq!(lines[18], expected);
        assert_eq!(lines[19], "");
        assert_eq!(lines[20], "FINISHED 100.00% VIDEO");
    }

    #[test]
    fn test_film_trailer() {
        let data = EsBuilder::mpeg2()
            .sequence()
            .gop(true)
            .picture(PictureSpec::i().tff().rff().progressive())
            .picture(PictureSpec::p().progressive())
            .picture(PictureSpec::p().rff().progressive())
            .build();
        let index = index_of(&data, ContainerKind::Elementary);
        let layout = SpanLayout::new(vec![SpanInfo {
            path: PathBuf::from("/a.m2v"),
            size: data.len() as u64,
        }]);
        let text = render(&layout, &index, None);
        assert!(text.ends_with("FINISHED  66.67% FILM\n"), "{}", text);
    }

    #[test]
    fn test_transport_stream_settings() {
        let data = two_gop_stream();
        let index = index_of(&data, ContainerKind::Transport);
        let layout = two_file_layout(data.len() as u64);
        let text = render(
            &layout,
            &index,
            Some(TransportPids {
                video: 0x1011,
                audio: 0x1100,
                pcr: 0,
            }),
        );
        assert!(text.contains("Stream_Type=2\nMPEG2_Transport_PID=1011,1100,0\nTransport_Packet_Size=188\n"));
    }

    #[test]
    fn test_matrix_from_display_extension() {
        let data = EsBuilder::mpeg2()
            .sequence()
            .display(1)
            .gop(true)
            .picture(PictureSpec::i())
            .build();
        let index = index_of(&data, ContainerKind::Elementary);
        assert_eq!(index.gops[0].matrix, 1);
        assert_eq!(index.sequence.matrix(), 1);
    }

    #[test]
    fn test_parse_round_trip() {
        let data = two_gop_stream();
        let index = index_of(&data, ContainerKind::Elementary);
        let layout = two_file_layout(data.len() as u64);
        let parsed = D2vIndex::parse(&render(&layout, &index, None)).unwrap();

        assert_eq!(parsed.version, D2V_VERSION);
        assert_eq!(
            parsed.files,
            vec![
                PathBuf::from("/media/VTS_01_1.VOB"),
                PathBuf::from("/media/VTS_01_2.VOB")
            ]
        );
        assert_eq!(parsed.setting("Stream_Type"), Some("0"));
        assert_eq!(parsed.setting("Location"), Some("0,0,0,0"));
        assert_eq!(parsed.gops.len(), 2);
        assert!(parsed.gops[0].closed());
        assert!(parsed.gops[0].new_sequence());
        assert!(!parsed.gops[1].closed());
        assert_eq!(parsed.gops[1].file, 1);
        assert_eq!(parsed.frame_count(), 6);
        assert_eq!(parsed.finished.as_deref(), Some("100.00% VIDEO"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            D2vIndex::parse("hello\n"),
            Err(IndexError::MalformedIndex(_))
        ));
        assert!(matches!(
            D2vIndex::parse("DGIndexProjectFile16\n2\n/a\n"),
            Err(IndexError::MalformedIndex(_))
        ));
        assert!(D2vIndex::parse("").is_err());
    }
}
