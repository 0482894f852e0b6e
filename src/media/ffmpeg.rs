//! MP4/H.264 codec backed by the ffmpeg binary.
//!
//! ffmpeg only converts between MP4 and YUV4MPEG2; all frame handling stays
//! in-process.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::debug;

use super::video::{Clip, VideoCodec};
use super::y4m::Y4mCodec;
use super::MediaError;

pub struct FfmpegCodec {
    binary: PathBuf,
}

impl FfmpegCodec {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn run(&self, args: &[&OsStr]) -> Result<(), MediaError> {
        let mut command = Command::new(&self.binary);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!("running {:?}", command);

        let output = command.output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                MediaError::VideoFormat(format!(
                    "{} was not found; install ffmpeg or set output.video_format = \"y4m\"",
                    self.binary.display()
                ))
            } else {
                MediaError::VideoFormat(format!("failed to run ffmpeg: {e}"))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::VideoFormat(format!(
                "ffmpeg failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl VideoCodec for FfmpegCodec {
    fn name(&self) -> &str {
        "mp4/h264"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Clip, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join("in.mp4");
        let output = scratch.path().join("out.y4m");
        std::fs::write(&input, bytes)?;

        self.run(&[
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-an"),
            OsStr::new("-pix_fmt"),
            OsStr::new("yuv420p"),
            OsStr::new("-f"),
            OsStr::new("yuv4mpegpipe"),
            output.as_os_str(),
        ])?;

        let y4m = std::fs::read(&output)?;
        Y4mCodec.decode(&y4m)
    }

    fn encode(&self, clip: &Clip) -> Result<Vec<u8>, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join("in.y4m");
        let output = scratch.path().join("out.mp4");
        std::fs::write(&input, Y4mCodec.encode(clip)?)?;

        // libx264 needs even dimensions for yuv420p.
        self.run(&[
            OsStr::new("-f"),
            OsStr::new("yuv4mpegpipe"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-vf"),
            OsStr::new("scale=trunc(iw/2)*2:trunc(ih/2)*2"),
            OsStr::new("-c:v"),
            OsStr::new("libx264"),
            OsStr::new("-pix_fmt"),
            OsStr::new("yuv420p"),
            OsStr::new("-movflags"),
            OsStr::new("+faststart"),
            output.as_os_str(),
        ])?;

        Ok(std::fs::read(&output)?)
    }
}

/// Working directory for one ffmpeg invocation, removed when dropped.
fn scratch_dir() -> Result<TempDir, MediaError> {
    Ok(tempfile::Builder::new().prefix("videocast-").tempdir()?)
}
