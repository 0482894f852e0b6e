use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::media::Container;
use crate::pipeline::{CombinedMedia, SegmentMedia};

/// Timestamp shared by every file of one run, e.g. `20261017T093000Z`.
pub fn run_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "character".to_string()
    } else {
        cleaned
    }
}

/// `segment_{n}_{character}_{timestamp}_{label}.{ext}` with `n` counted from 1.
pub fn segment_file_name(index: usize, character: &str, stamp: &str, label: &str, ext: &str) -> String {
    format!(
        "segment_{}_{}_{}_{}.{}",
        index + 1,
        sanitize_name(character),
        stamp,
        label,
        ext
    )
}

pub fn combined_file_name(kind: &str, stamp: &str, ext: &str) -> String {
    format!("combined_{kind}_{stamp}.{ext}")
}

/// One file written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFile {
    /// Segment index, or `None` for combined output.
    pub segment: Option<usize>,
    pub label: &'static str,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Writes segment and combined media into one directory under a fixed timestamp.
pub struct OutputWriter {
    dir: PathBuf,
    stamp: String,
    video_ext: &'static str,
}

impl OutputWriter {
    pub fn create(dir: &Path, stamp: String, container: Container) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            stamp,
            video_ext: container.extension(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_segment(&self, media: &SegmentMedia) -> std::io::Result<Vec<WrittenFile>> {
        let audio = self.write(
            &segment_file_name(media.index, &media.character, &self.stamp, "audio", "wav"),
            &media.audio,
        )?;
        let video = self.write(
            &segment_file_name(media.index, &media.character, &self.stamp, "video", self.video_ext),
            &media.video,
        )?;
        Ok(vec![
            WrittenFile {
                segment: Some(media.index),
                label: "audio",
                path: audio,
                bytes: media.audio.len() as u64,
            },
            WrittenFile {
                segment: Some(media.index),
                label: "video",
                path: video,
                bytes: media.video.len() as u64,
            },
        ])
    }

    pub fn write_combined(&self, combined: &CombinedMedia) -> std::io::Result<Vec<WrittenFile>> {
        let video = self.write(
            &combined_file_name("video", &self.stamp, self.video_ext),
            &combined.video,
        )?;
        let audio = self.write(&combined_file_name("audio", &self.stamp, "wav"), &combined.audio)?;
        Ok(vec![
            WrittenFile {
                segment: None,
                label: "combined video",
                path: video,
                bytes: combined.video.len() as u64,
            },
            WrittenFile {
                segment: None,
                label: "combined audio",
                path: audio,
                bytes: combined.audio.len() as u64,
            },
        ])
    }

    fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
        Ok(path)
    }
}
