//! Logical multi-file stream
//!
//! Presents an ordered list of physical files as one contiguous byte range
//! `[0, total_size)`. Reads and seeks cross file boundaries transparently;
//! the demuxer never learns where one file ends and the next begins.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// `span_index` value when no file handle is known to match the cursor
const NO_SPAN: usize = usize::MAX;

/// One physical input file: path and size measured at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanInfo {
    pub path: PathBuf,
    pub size: u64,
}

/// The immutable layout of a logical stream.
///
/// Kept separate from the open handles so that offsets recorded during a
/// pass can be mapped back to `(file, offset)` after the stream is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanLayout {
    spans: Vec<SpanInfo>,
    total_size: u64,
}

impl SpanLayout {
    pub fn new(spans: Vec<SpanInfo>) -> Self {
        let total_size = spans.iter().map(|s| s.size).sum();
        Self { spans, total_size }
    }

    pub fn spans(&self) -> &[SpanInfo] {
        &self.spans
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Map a logical offset to `(span index, offset within span)`.
    ///
    /// Returns `None` at or past the end of the stream. Empty spans never own
    /// an offset.
    pub fn resolve(&self, offset: u64) -> Option<(usize, u64)> {
        let mut remaining = offset;
        for (index, span) in self.spans.iter().enumerate() {
            if remaining < span.size {
                return Some((index, remaining));
            }
            remaining -= span.size;
        }
        None
    }

    /// Like [`resolve`](Self::resolve), but pins end-of-stream to the end of
    /// the last span.
    fn locate(&self, offset: u64) -> (usize, u64) {
        self.resolve(offset).unwrap_or_else(|| {
            let last = self.spans.len().saturating_sub(1);
            (last, self.spans.get(last).map_or(0, |s| s.size))
        })
    }
}

/// Seek origin, matching the demuxer callback contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
    /// Report the total size without moving the cursor.
    Size,
}

/// Single-cursor reader over all input files.
#[derive(Debug)]
pub struct LogicalStream {
    layout: SpanLayout,
    files: Vec<File>,
    span_index: usize,
    position: u64,
}

impl LogicalStream {
    /// Open every file, measure it and rewind it.
    ///
    /// Fails on the first file that cannot be opened, sized or rewound.
    /// Handles opened before the failure are dropped (closed) on return.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Err(IndexError::NoInputFiles);
        }

        let mut spans = Vec::with_capacity(paths.len());
        let mut files = Vec::with_capacity(paths.len());

        for path in paths {
            let path = path.as_ref();
            let open_err = |source| IndexError::Open {
                path: path.to_path_buf(),
                source,
            };

            let mut file = File::open(path).map_err(open_err)?;
            let size = file.seek(SeekFrom::End(0)).map_err(open_err)?;
            file.seek(SeekFrom::Start(0)).map_err(open_err)?;

            tracing::debug!("Opened input span {:?} ({} bytes)", path, size);

            spans.push(SpanInfo {
                path: path.to_path_buf(),
                size,
            });
            files.push(file);
        }

        Ok(Self {
            layout: SpanLayout::new(spans),
            files,
            span_index: 0,
            position: 0,
        })
    }

    pub fn layout(&self) -> &SpanLayout {
        &self.layout
    }

    pub fn total_size(&self) -> u64 {
        self.layout.total_size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill up to `buf.len()` bytes from the cursor, continuing into the
    /// following files as needed.
    ///
    /// Returns fewer bytes only at end of stream. A file that ends earlier
    /// than its measured size is a read error, not a short read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        while filled < buf.len() && self.position < self.layout.total_size {
            let (index, offset) = self.layout.locate(self.position);
            if index != self.span_index {
                self.reposition(index, offset)?;
            }

            let span = &self.layout.spans[index];
            let want = (buf.len() - filled).min((span.size - offset) as usize);

            if let Err(source) = self.files[index].read_exact(&mut buf[filled..filled + want]) {
                self.span_index = NO_SPAN;
                return Err(IndexError::Read {
                    path: span.path.clone(),
                    source,
                });
            }

            filled += want;
            self.position += want as u64;
        }

        Ok(filled)
    }

    /// Move the cursor. Returns the new position, or the total size for
    /// [`Whence::Size`].
    ///
    /// Targets at or past the end clamp to end of stream.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Size => return Ok(self.layout.total_size),
            Whence::Start => 0i128,
            Whence::Current => self.position as i128,
            Whence::End => self.layout.total_size as i128,
        };

        let target = base + offset as i128;
        if target < 0 {
            return Err(IndexError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to negative offset {}", target),
            )));
        }

        let target = (target as u64).min(self.layout.total_size);
        let (index, in_span) = self.layout.locate(target);
        self.reposition(index, in_span)?;
        self.position = target;

        Ok(target)
    }

    fn reposition(&mut self, index: usize, offset: u64) -> Result<()> {
        self.span_index = NO_SPAN;
        self.files[index]
            .seek(SeekFrom::Start(offset))
            .map_err(|source| IndexError::Read {
                path: self.layout.spans[index].path.clone(),
                source,
            })?;
        self.span_index = index;
        Ok(())
    }
}

impl Read for LogicalStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        LogicalStream::read(self, buf).map_err(io::Error::other)
    }
}

impl Seek for LogicalStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(p) => (i64::try_from(p).unwrap_or(i64::MAX), Whence::Start),
            SeekFrom::Current(p) => (p, Whence::Current),
            SeekFrom::End(p) => (p, Whence::End),
        };
        LogicalStream::seek(self, offset, whence).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, byte: u8, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![byte; len]).unwrap();
        path
    }

    fn two_files() -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", 0xAA, 100);
        let b = write_file(&dir, "b.bin", 0xBB, 50);
        (dir, vec![a, b])
    }

    #[test]
    fn test_total_size_is_sum_of_files() {
        let (_dir, paths) = two_files();
        let stream = LogicalStream::open(&paths).unwrap();
        assert_eq!(stream.total_size(), 150);
        assert_eq!(stream.layout().spans()[0].size, 100);
        assert_eq!(stream.layout().spans()[1].size, 50);
    }

    #[test]
    fn test_read_straddles_file_boundary() {
        let (_dir, paths) = two_files();
        let mut stream = LogicalStream::open(&paths).unwrap();

        assert_eq!(stream.seek(90, Whence::Start).unwrap(), 90);
        let mut buf = [0u8; 20];
        assert_eq!(stream.read(&mut buf).unwrap(), 20);
        assert_eq!(&buf[..10], &[0xAA; 10]);
        assert_eq!(&buf[10..], &[0xBB; 10]);
        assert_eq!(stream.position(), 110);
    }

    #[test]
    fn test_failed_read_does_not_misalign_cursor() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", 0xAA, 100);
        let b = dir.path().join("b.bin");
        let b_data: Vec<u8> = (0..50u8).collect();
        std::fs::write(&b, &b_data).unwrap();

        let mut stream = LogicalStream::open(&[a, b.clone()]).unwrap();

        // The second file shrinks underneath the stream.
        std::fs::write(&b, &b_data[..20]).unwrap();
        stream.seek(90, Whence::Start).unwrap();
        let mut buf = [0u8; 40];
        assert!(matches!(
            stream.read(&mut buf),
            Err(IndexError::Read { ref path, .. }) if path == &b
        ));
        assert_eq!(stream.position(), 100);

        std::fs::write(&b, &b_data).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf[..], &b_data[..10]);
    }

    #[test]
    fn test_sequential_reads_match_concatenation() {
        let dir = TempDir::new().unwrap();
        let mut expected = Vec::new();
        let mut paths = Vec::new();
        for (i, len) in [7usize, 0, 13, 1, 29].iter().enumerate() {
            let data: Vec<u8> = (0..*len).map(|b| (b * 3 + i * 50) as u8).collect();
            let path = dir.path().join(format!("part{}.bin", i));
            std::fs::write(&path, &data).unwrap();
            expected.extend_from_slice(&data);
            paths.push(path);
        }

        let mut stream = LogicalStream::open(&paths).unwrap();
        let mut got = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, expected);

        // Random access through the std traits as well.
        Seek::seek(&mut stream, SeekFrom::Start(19)).unwrap();
        let mut two = [0u8; 2];
        Read::read_exact(&mut stream, &mut two).unwrap();
        assert_eq!(&two, &expected[19..21]);
    }

    #[test]
    fn test_relative_and_end_seeks() {
        let (_dir, paths) = two_files();
        let mut stream = LogicalStream::open(&paths).unwrap();

        stream.seek(10, Whence::Start).unwrap();
        assert_eq!(stream.seek(95, Whence::Current).unwrap(), 105);
        assert_eq!(stream.seek(-60, Whence::End).unwrap(), 90);
        assert_eq!(stream.seek(0, Whence::Size).unwrap(), 150);
        assert_eq!(stream.position(), 90);
        assert!(stream.seek(-1, Whence::Start).is_err());
    }

    #[test]
    fn test_seek_past_end_clamps_and_reads_nothing() {
        let (_dir, paths) = two_files();
        let mut stream = LogicalStream::open(&paths).unwrap();

        assert_eq!(stream.seek(1000, Whence::Start).unwrap(), 150);
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);

        // The cursor is still usable afterwards.
        stream.seek(99, Whence::Start).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 8);
        assert_eq!(buf[0], 0xAA);
        assert_eq!(buf[1], 0xBB);
    }

    #[test]
    fn test_resolve_skips_empty_spans() {
        let layout = SpanLayout::new(vec![
            SpanInfo { path: "a".into(), size: 10 },
            SpanInfo { path: "b".into(), size: 0 },
            SpanInfo { path: "c".into(), size: 5 },
        ]);
        assert_eq!(layout.resolve(0), Some((0, 0)));
        assert_eq!(layout.resolve(9), Some((0, 9)));
        assert_eq!(layout.resolve(10), Some((2, 0)));
        assert_eq!(layout.resolve(14), Some((2, 4)));
        assert_eq!(layout.resolve(15), None);
    }

    #[test]
    fn test_open_failure_names_missing_file() {
        let (dir, mut paths) = two_files();
        paths.insert(1, dir.path().join("missing.bin"));

        let err = LogicalStream::open(&paths).unwrap_err();
        match err {
            IndexError::Open { path, .. } => assert!(path.ends_with("missing.bin")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_requires_files() {
        let none: Vec<PathBuf> = Vec::new();
        assert!(matches!(
            LogicalStream::open(&none),
            Err(IndexError::NoInputFiles)
        ));
    }
}
