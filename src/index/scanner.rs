//! Index pass driver - opens the inputs, selects tracks and writes the index

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{IndexJob, OutputTarget};
use crate::demux::{select_audio, select_video, ContainerKind, PacketSource, TrackDescriptor};
use crate::error::{IndexError, Result};
use crate::index::analyzer::Analyzer;
use crate::index::audio::AudioSinks;
use crate::index::d2v::{write_d2v, TransportPids};
use crate::index::hooks::Hooks;
use crate::index::record::Stats;
use crate::input::{LogicalStream, SpanLayout};

/// Inputs and tracks as the demuxer sees them
#[derive(Debug, Clone)]
pub struct Probe {
    pub layout: SpanLayout,
    pub container: ContainerKind,
    pub tracks: Vec<TrackDescriptor>,
}

/// Open the packet source for a logical stream.
#[cfg(feature = "ffmpeg")]
pub fn open_source(stream: LogicalStream) -> Result<Box<dyn PacketSource>> {
    Ok(Box::new(crate::ffmpeg::FfmpegSource::open(stream)?))
}

/// Open the packet source for a logical stream.
///
/// Without the container library only raw video elementary streams can be read.
#[cfg(not(feature = "ffmpeg"))]
pub fn open_source(stream: LogicalStream) -> Result<Box<dyn PacketSource>> {
    Ok(Box::new(crate::demux::ElementarySource::new(stream)?))
}

/// Enumerate container and tracks without indexing.
pub fn probe(inputs: &[PathBuf]) -> Result<Probe> {
    let stream = LogicalStream::open(inputs)?;
    let layout = stream.layout().clone();
    let source = open_source(stream)?;

    Ok(Probe {
        layout,
        container: source.container(),
        tracks: source.tracks().to_vec(),
    })
}

/// Run a complete indexing job.
pub fn scan(job: &IndexJob, hooks: Hooks<'_>) -> Result<Stats> {
    let stream = LogicalStream::open(&job.inputs)?;
    let layout = stream.layout().clone();
    let mut source = open_source(stream)?;
    scan_source(source.as_mut(), &layout, job, hooks)
}

/// Index everything `source` delivers. `layout` describes the files behind it.
pub fn scan_source(
    source: &mut dyn PacketSource,
    layout: &SpanLayout,
    job: &IndexJob,
    hooks: Hooks<'_>,
) -> Result<Stats> {
    let container = source.container();
    let tracks = source.tracks().to_vec();

    let video = select_video(&tracks, &job.video)?;
    if !video.codec.is_supported_video() {
        return Err(IndexError::UnsupportedCodec(format!(
            "{} (track {:x})",
            video.codec.name(),
            video.id
        )));
    }
    let audio = select_audio(&tracks, &job.audio)?;

    tracing::info!(
        "Indexing {} ({} file(s), {} bytes), video track {:x}, {} audio track(s)",
        container.name(),
        layout.spans().len(),
        layout.total_size(),
        video.id,
        audio.len()
    );

    let mut keep = vec![video.index];
    keep.extend(audio.iter().map(|t| t.index));
    source.retain_tracks(&keep);

    let sinks = AudioSinks::open(job.output.audio_base(job.first_input()), &audio)?;

    let pids = (container == ContainerKind::Transport).then(|| TransportPids {
        video: video.id,
        audio: audio.first().map_or(0, |t| t.id),
        pcr: video.pcr_pid.unwrap_or(video.id),
    });

    let analyzer = Analyzer::new(video.id, container, sinks, hooks, job.progress_interval);
    let index = analyzer.run(source)?;

    // Only a completed pass creates the index file.
    let (mut output, output_path) = open_output(&job.output)?;
    let write_err = |source| IndexError::Write {
        path: output_path.clone(),
        source,
    };
    write_d2v(&mut output, layout, &index, pids).map_err(write_err)?;
    output.flush().map_err(write_err)?;

    for track in &index.audio {
        tracing::info!(
            "Audio track {:x}: {} bytes written to {}",
            track.track_id,
            track.bytes,
            track.path.display()
        );
    }
    tracing::info!(
        "Wrote {} GOPs, {} frames to {}",
        index.gops.len(),
        index.stats.video_frames,
        output_path.display()
    );

    Ok(index.stats)
}

fn open_output(target: &OutputTarget) -> Result<(Box<dyn Write>, PathBuf)> {
    match target {
        OutputTarget::Stdout => Ok((
            Box::new(BufWriter::new(io::stdout().lock())),
            PathBuf::from("-"),
        )),
        OutputTarget::File(path) => {
            let file = create(path)?;
            Ok((Box::new(BufWriter::new(file)), path.clone()))
        }
    }
}

fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| IndexError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioSelection, VideoSelection};
    use crate::demux::{ElementarySource, TrackCodec};
    use crate::index::d2v::D2vIndex;
    use crate::tests::fixtures::{two_gop_stream, MemorySource};
    use tempfile::TempDir;

    fn job(dir: &TempDir, audio: AudioSelection) -> IndexJob {
        let input = dir.path().join("movie.vob");
        IndexJob::new(
            &[input],
            Some(&dir.path().join("movie.d2v")),
            VideoSelection::First,
            audio,
        )
        .unwrap()
    }

    fn single_file(job: &IndexJob) -> SpanLayout {
        SpanLayout::new(vec![crate::input::SpanInfo {
            path: job.inputs[0].clone(),
            size: 1 << 20,
        }])
    }

    fn program_stream() -> MemorySource {
        let mut source = MemorySource::new(
            ContainerKind::Program,
            vec![
                TrackDescriptor::video(0, 0xe0, TrackCodec::Mpeg2Video),
                TrackDescriptor::audio(1, 0x80, TrackCodec::Other("ac3".to_string())),
                TrackDescriptor::audio(2, 0x81, TrackCodec::Other("ac3".to_string())),
            ],
        );
        for (n, chunk) in two_gop_stream().chunks(100).enumerate() {
            source.push(0xe0, chunk, 2048);
            source.push(0x80, &[n as u8; 16], 2048);
            source.push(0x81, &[0xAB; 8], 2048);
        }
        source
    }

    #[test]
    fn test_program_stream_with_audio() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, AudioSelection::Ids(vec![0x80]));
        let layout = single_file(&job);

        let mut progress = Vec::new();
        let stats = {
            let hooks = Hooks::silent().with_progress(|done, total| progress.push((done, total)));
            scan_source(&mut program_stream(), &layout, &job, hooks).unwrap()
        };
        assert_eq!(stats.video_frames, 6);
        assert_eq!(progress.last().map(|p| p.0), progress.last().map(|p| p.1));

        let audio = std::fs::read(dir.path().join("movie.d2v T80.audio")).unwrap();
        assert_eq!(audio.len() % 16, 0);
        assert!(!dir.path().join("movie.d2v T81.audio").exists());

        let text = std::fs::read_to_string(dir.path().join("movie.d2v")).unwrap();
        let index = D2vIndex::parse(&text).unwrap();
        assert_eq!(index.setting("Stream_Type"), Some("1"));
        for gop in &index.gops {
            assert_eq!(gop.position % 2048, 0);
        }
    }

    #[test]
    fn test_unselected_tracks_are_dropped_from_source() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, AudioSelection::Ids(vec![0x81]));
        let mut source = program_stream();

        scan_source(&mut source, &single_file(&job), &job, Hooks::silent()).unwrap();

        let ids: Vec<i32> = source.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0xe0, 0x81]);
        assert!(!dir.path().join("movie.d2v T80.audio").exists());
    }

    fn transport_stream(pcr_pid: Option<i32>) -> MemorySource {
        let mut video = TrackDescriptor::video(0, 0x1011, TrackCodec::Mpeg2Video);
        video.pcr_pid = pcr_pid;
        let mut source = MemorySource::new(
            ContainerKind::Transport,
            vec![
                video,
                TrackDescriptor::audio(1, 0x1100, TrackCodec::Other("ac3".to_string())),
            ],
        );
        for chunk in two_gop_stream().chunks(150) {
            source.push(0x1011, chunk, 188 * 4);
        }
        source
    }

    fn transport_pid_line(pcr_pid: Option<i32>) -> String {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, AudioSelection::All);
        scan_source(
            &mut transport_stream(pcr_pid),
            &single_file(&job),
            &job,
            Hooks::silent(),
        )
        .unwrap();

        let text = std::fs::read_to_string(dir.path().join("movie.d2v")).unwrap();
        let index = D2vIndex::parse(&text).unwrap();
        index.setting("MPEG2_Transport_PID").unwrap().to_string()
    }

    #[test]
    fn test_transport_pids_use_program_pcr() {
        assert_eq!(transport_pid_line(Some(0x1001)), "1011,1100,1001");
    }

    #[test]
    fn test_transport_pcr_falls_back_to_video_pid() {
        assert_eq!(transport_pid_line(None), "1011,1100,1011");
    }

    #[test]
    fn test_missing_audio_track_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, AudioSelection::Ids(vec![0x80, 0x90]));
        let layout = SpanLayout::new(Vec::new());

        let err = scan_source(&mut program_stream(), &layout, &job, Hooks::silent()).unwrap_err();
        assert!(matches!(err, IndexError::AudioTracksNotFound(ref ids) if ids == &vec![0x90]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unsupported_video_codec() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, AudioSelection::None);
        let mut source = MemorySource::new(
            ContainerKind::Program,
            vec![TrackDescriptor::video(0, 0xe0, TrackCodec::Other("h264".to_string()))],
        );

        let err = scan_source(&mut source, &SpanLayout::new(Vec::new()), &job, Hooks::silent())
            .unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedCodec(_)));
        assert!(err.to_string().contains("h264"));
    }

    #[test]
    fn test_elementary_source_end_to_end() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.m2v");
        std::fs::write(&input, two_gop_stream()).unwrap();
        let job = IndexJob::new(
            &[input.clone()],
            None,
            VideoSelection::First,
            AudioSelection::None,
        )
        .unwrap();

        let stream = LogicalStream::open(&job.inputs).unwrap();
        let layout = stream.layout().clone();
        let mut source = ElementarySource::with_chunk_size(stream, 17).unwrap();
        let stats = scan_source(&mut source, &layout, &job, Hooks::silent()).unwrap();
        assert_eq!(stats.video_frames, 6);

        let text = std::fs::read_to_string(dir.path().join("clip.m2v.d2v")).unwrap();
        assert!(text.starts_with("DGIndexProjectFile16\n1\n"));
    }
}
