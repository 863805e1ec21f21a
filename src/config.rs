//! Index job configuration

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{IndexError, Result};

/// Default progress reporting interval in bytes
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1024 * 1024;

/// Which video track to index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSelection {
    /// The first video track the demuxer reports
    #[default]
    First,
    Id(i32),
}

/// Which audio tracks to demux into side files
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AudioSelection {
    #[default]
    None,
    All,
    Ids(Vec<i32>),
}

impl FromStr for AudioSelection {
    type Err = String;

    /// Parse `all` or a comma-separated list of hexadecimal ids.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Self::All);
        }

        let ids = s
            .split(',')
            .map(parse_hex_id)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::Ids(ids))
    }
}

/// Parse a track id given in hexadecimal, with or without `0x`.
pub fn parse_hex_id(s: &str) -> std::result::Result<i32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err(format!("Invalid track id '{}'.", s));
    }
    i32::from_str_radix(digits, 16)
        .map_err(|_| format!("Track id '{}' is not a valid hexadecimal number.", s))
}

/// Where the index goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// `-` means standard output; no path means `<first input>.d2v`.
    pub fn resolve(arg: Option<&Path>, first_input: &Path) -> Self {
        match arg {
            Some(p) if p == Path::new("-") => Self::Stdout,
            Some(p) => Self::File(p.to_path_buf()),
            None => {
                let mut name = first_input.as_os_str().to_os_string();
                name.push(".d2v");
                Self::File(PathBuf::from(name))
            }
        }
    }

    /// Base name for audio side files.
    pub fn audio_base<'a>(&'a self, first_input: &'a Path) -> &'a Path {
        match self {
            Self::Stdout => first_input,
            Self::File(path) => path,
        }
    }
}

/// A fully resolved indexing job
#[derive(Debug, Clone)]
pub struct IndexJob {
    /// Absolute input paths in logical stream order
    pub inputs: Vec<PathBuf>,
    pub output: OutputTarget,
    pub video: VideoSelection,
    pub audio: AudioSelection,
    /// Minimum number of bytes between progress reports
    pub progress_interval: u64,
}

impl IndexJob {
    /// Build a job, turning input paths into absolute paths.
    pub fn new(
        inputs: &[PathBuf],
        output: Option<&Path>,
        video: VideoSelection,
        audio: AudioSelection,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(IndexError::NoInputFiles);
        }

        let inputs = inputs
            .iter()
            .map(|p| {
                std::path::absolute(p).map_err(|e| {
                    IndexError::Config(format!(
                        "Failed to turn '{}' into an absolute path: {}",
                        p.display(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let output = OutputTarget::resolve(output, &inputs[0]);

        Ok(Self {
            inputs,
            output,
            video,
            audio,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        })
    }

    pub fn first_input(&self) -> &Path {
        &self.inputs[0]
    }
}
