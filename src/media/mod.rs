//! Combining per-segment media into one audio track and one video.
//!
//! Audio is concatenated sample-for-sample as WAV. Video is decoded to planar
//! YUV 4:2:0 frames, re-timed onto a fixed output frame rate and re-encoded
//! with the configured codec.

pub mod audio;
pub mod ffmpeg;
pub mod video;
pub mod y4m;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub use audio::concatenate_audio;
pub use video::concatenate_video;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("nothing to concatenate")]
    NoInput,

    #[error("audio format error: {0}")]
    AudioFormat(String),

    #[error("video format error: {0}")]
    VideoFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output container for combined and per-segment video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// H.264 in MP4, encoded by the ffmpeg binary.
    #[default]
    Mp4,
    /// Raw YUV4MPEG2, handled in-process.
    Y4m,
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "y4m" | "yuv4mpeg" => Ok(Container::Y4m),
            _ => Err(format!("Unknown video format: {s}. Use: mp4, y4m")),
        }
    }
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Y4m => "y4m",
        }
    }
}

pub const DEFAULT_FRAME_RATE: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub container: Container,
    pub frame_rate: u32,
    /// ffmpeg binary used for the MP4 container.
    pub ffmpeg: PathBuf,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            container: Container::Mp4,
            frame_rate: DEFAULT_FRAME_RATE,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl VideoSettings {
    pub fn y4m(frame_rate: u32) -> Self {
        Self {
            container: Container::Y4m,
            frame_rate,
            ..Self::default()
        }
    }

    pub fn codec(&self) -> Box<dyn video::VideoCodec> {
        match self.container {
            Container::Mp4 => Box::new(ffmpeg::FfmpegCodec::new(self.ffmpeg.clone())),
            Container::Y4m => Box::new(y4m::Y4mCodec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_parsing() {
        assert_eq!("MP4".parse::<Container>(), Ok(Container::Mp4));
        assert_eq!("yuv4mpeg".parse::<Container>(), Ok(Container::Y4m));
        let err = "webm".parse::<Container>().unwrap_err();
        assert!(err.contains("webm"));
        assert_eq!(Container::Y4m.extension(), "y4m");
    }

    #[test]
    fn container_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct W {
            c: Container,
        }
        let w: W = toml::from_str("c = \"y4m\"").unwrap();
        assert_eq!(w.c, Container::Y4m);
    }
}
