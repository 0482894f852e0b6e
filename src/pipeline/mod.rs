//! Runs the synthesizer over a whole script and assembles the combined media.

pub mod results;

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

pub use results::{ResultStore, SegmentKey, SegmentMedia};

use crate::media::{self, MediaError, VideoSettings};
use crate::script::{Script, Segment};
use crate::services::Portrait;
use crate::synth::{SegmentSynthesizer, SynthesisError};

/// Voice and portrait chosen for one character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastMember {
    pub voice_id: Option<String>,
    pub portrait: Option<Portrait>,
}

/// Voice and portrait assignments for every character of a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cast {
    members: BTreeMap<String, CastMember>,
}

impl Cast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_voice(&mut self, character: &str, voice_id: impl Into<String>) {
        self.members.entry(character.to_string()).or_default().voice_id = Some(voice_id.into());
    }

    pub fn set_portrait(&mut self, character: &str, portrait: Portrait) {
        self.members.entry(character.to_string()).or_default().portrait = Some(portrait);
    }

    pub fn get(&self, character: &str) -> Option<&CastMember> {
        self.members.get(character)
    }

    pub fn voice(&self, character: &str) -> Option<&str> {
        self.get(character)?.voice_id.as_deref()
    }

    pub fn portrait(&self, character: &str) -> Option<&Portrait> {
        self.get(character)?.portrait.as_ref()
    }

    /// Names assigned here that the script never mentions.
    pub fn unknown_characters<'a>(&'a self, script: &Script) -> Vec<&'a str> {
        self.members
            .keys()
            .filter(|name| script.segments_for(name).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Roster characters lacking a voice or a portrait, in roster order.
    pub fn incomplete_characters<'a>(&self, script: &'a Script) -> Vec<&'a str> {
        script
            .characters()
            .into_iter()
            .filter(|name| self.voice(name).is_none() || self.portrait(name).is_none())
            .collect()
    }

    /// Whether every character in the script has both a voice and a portrait.
    pub fn is_complete(&self, script: &Script) -> bool {
        self.incomplete_characters(script).is_empty()
    }
}

/// A segment with no usable media at assembly time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSegment {
    pub index: usize,
    pub character: String,
    pub text: String,
}

impl MissingSegment {
    fn from_segment(segment: &Segment) -> Self {
        Self {
            index: segment.index,
            character: segment.character.clone(),
            text: segment.text.clone(),
        }
    }
}

fn describe_missing(missing: &[MissingSegment]) -> String {
    missing
        .iter()
        .map(|m| format!("#{} {}: \"{}\"", m.index + 1, m.character, m.text))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("character {character} has a portrait but no voice assigned")]
    MissingVoice { character: String },

    #[error("character {character} has no portrait assigned")]
    MissingPortrait { character: String },

    #[error("no segment #{0}")]
    UnknownSegment(usize),

    #[error("{} segment(s) have no media: {}", .missing.len(), describe_missing(.missing))]
    Incomplete { missing: Vec<MissingSegment> },

    #[error("segment #{} ({character}) failed: {source}", .index + 1)]
    Synthesis {
        index: usize,
        character: String,
        #[source]
        source: SynthesisError,
    },

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// The two combined files of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedMedia {
    pub audio: Vec<u8>,
    pub video: Vec<u8>,
    pub segment_count: usize,
}

/// Drives segment synthesis for a script and keeps the results.
///
/// Results gathered before a failure stay in [`Coordinator::results`].
pub struct Coordinator<'a> {
    synth: SegmentSynthesizer<'a>,
    video: VideoSettings,
    results: ResultStore,
}

impl<'a> Coordinator<'a> {
    pub fn new(synth: SegmentSynthesizer<'a>, video: VideoSettings) -> Self {
        Self {
            synth,
            video,
            results: ResultStore::new(),
        }
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Generate every segment, then assemble the combined media.
    ///
    /// Characters without a portrait are skipped and their segments reported
    /// as missing. The first synthesis failure aborts the run.
    pub fn run(&mut self, script: &Script, cast: &Cast) -> Result<CombinedMedia, PipelineError> {
        info!(
            segments = script.segments.len(),
            characters = script.roster.len(),
            "starting generation run"
        );

        for entry in &script.roster {
            let Some(portrait) = cast.portrait(&entry.name) else {
                warn!(character = %entry.name, "no portrait assigned, skipping character");
                continue;
            };
            let voice_id = cast
                .voice(&entry.name)
                .ok_or_else(|| PipelineError::MissingVoice {
                    character: entry.name.clone(),
                })?;

            for &index in &entry.segments {
                let segment = script
                    .segment(index)
                    .ok_or(PipelineError::UnknownSegment(index))?;
                self.synthesize_one(segment, voice_id, portrait)?;
            }
        }

        self.assemble(script)
    }

    /// Generate media for a single segment, replacing any earlier result for it.
    pub fn generate_segment(
        &mut self,
        script: &Script,
        index: usize,
        cast: &Cast,
    ) -> Result<&SegmentMedia, PipelineError> {
        let segment = script
            .segment(index)
            .ok_or(PipelineError::UnknownSegment(index))?;
        let portrait = cast
            .portrait(&segment.character)
            .ok_or_else(|| PipelineError::MissingPortrait {
                character: segment.character.clone(),
            })?;
        let voice_id = cast
            .voice(&segment.character)
            .ok_or_else(|| PipelineError::MissingVoice {
                character: segment.character.clone(),
            })?;

        self.synthesize_one(segment, voice_id, portrait)?;
        self.results
            .get(segment)
            .ok_or_else(|| PipelineError::Incomplete {
                missing: vec![MissingSegment::from_segment(segment)],
            })
    }

    /// Concatenate the stored results in script order.
    ///
    /// Fails without producing anything when any segment lacks a result
    /// matching its current text.
    pub fn assemble(&self, script: &Script) -> Result<CombinedMedia, PipelineError> {
        let mut audio = Vec::with_capacity(script.segments.len());
        let mut video = Vec::with_capacity(script.segments.len());
        let mut missing = Vec::new();

        for segment in &script.segments {
            match self.results.get(segment) {
                Some(m) if !m.audio.is_empty() && !m.video.is_empty() => {
                    audio.push(m.audio.as_slice());
                    video.push(m.video.as_slice());
                }
                _ => missing.push(MissingSegment::from_segment(segment)),
            }
        }

        if !missing.is_empty() {
            warn!(count = missing.len(), "cannot assemble, segments missing");
            return Err(PipelineError::Incomplete { missing });
        }

        let combined_audio = media::concatenate_audio(&audio)?;
        let combined_video = media::concatenate_video(&video, &self.video)?;
        info!(
            segments = script.segments.len(),
            audio_bytes = combined_audio.len(),
            video_bytes = combined_video.len(),
            "assembled combined media"
        );

        Ok(CombinedMedia {
            audio: combined_audio,
            video: combined_video,
            segment_count: script.segments.len(),
        })
    }

    fn synthesize_one(
        &mut self,
        segment: &Segment,
        voice_id: &str,
        portrait: &Portrait,
    ) -> Result<(), PipelineError> {
        let generated = self
            .synth
            .synthesize(segment, voice_id, portrait)
            .map_err(|source| PipelineError::Synthesis {
                index: segment.index,
                character: segment.character.clone(),
                source,
            })?;

        self.results.insert(
            SegmentKey::for_segment(segment),
            SegmentMedia {
                index: segment.index,
                character: segment.character.clone(),
                text: segment.text.clone(),
                language: segment.language.clone(),
                job_id: generated.job_id,
                audio: generated.audio,
                video: generated.video,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;

    fn script() -> Script {
        parse("Alice: one\nBob: two\nAlice: three").unwrap()
    }

    fn portrait() -> Portrait {
        Portrait::new(vec![0x89, b'P'], "face.png")
    }

    #[test]
    fn cast_completeness() {
        let script = script();
        let mut cast = Cast::new();
        assert!(!cast.is_complete(&script));
        assert_eq!(cast.incomplete_characters(&script), vec!["Alice", "Bob"]);

        cast.set_voice("Alice", "v-a");
        cast.set_portrait("Alice", portrait());
        cast.set_voice("Bob", "v-b");
        assert_eq!(cast.incomplete_characters(&script), vec!["Bob"]);

        cast.set_portrait("Bob", portrait());
        assert!(cast.is_complete(&script));
    }

    #[test]
    fn cast_reports_unknown_names() {
        let script = script();
        let mut cast = Cast::new();
        cast.set_voice("Alice", "v-a");
        cast.set_voice("Carol", "v-c");
        assert_eq!(cast.unknown_characters(&script), vec!["Carol"]);
    }

    #[test]
    fn incomplete_message_lists_segments() {
        let err = PipelineError::Incomplete {
            missing: vec![MissingSegment {
                index: 1,
                character: "Bob".into(),
                text: "two".into(),
            }],
        };
        assert_eq!(err.to_string(), "1 segment(s) have no media: #2 Bob: \"two\"");
    }
}
