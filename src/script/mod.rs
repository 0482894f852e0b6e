pub mod parser;

use serde::Serialize;
use thiserror::Error;

pub use parser::parse;

/// Language used for speech synthesis when a segment has no override.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Languages offered by the speech model. Other codes are passed through as-is.
pub const KNOWN_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("de", "German"),
    ("pl", "Polish"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("fr", "French"),
    ("pt", "Portuguese"),
    ("hi", "Hindi"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("script is empty")]
    Empty,

    #[error("line {line}: expected \"Character: dialogue\"")]
    MalformedLine { line: usize },

    #[error("line {line}: empty character name")]
    EmptyCharacterName { line: usize },

    #[error("line {line}: empty dialogue")]
    EmptyDialogue { line: usize },

    #[error("too few characters: found {found}, a conversation needs at least 2")]
    TooFewCharacters { found: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no segment at index {0}")]
    UnknownSegment(usize),

    #[error("segment text cannot be empty")]
    EmptyText,
}

/// One spoken line of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Position in the original script; never changes after parsing.
    pub index: usize,
    pub character: String,
    pub text: String,
    pub language: String,
    /// Bumped on every edit so cached media from an earlier state is never reused.
    pub revision: u64,
}

impl Segment {
    pub fn new(index: usize, character: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            character: character.into(),
            text: text.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            revision: 0,
        }
    }

    pub fn set_text(&mut self, text: &str) -> Result<(), EditError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EditError::EmptyText);
        }
        self.text = text.to_string();
        self.revision += 1;
        Ok(())
    }

    pub fn set_language(&mut self, language: &str) {
        let language = language.trim();
        self.language = if language.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            language.to_string()
        };
        self.revision += 1;
    }
}

/// A character and the indices of its segments, in script order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub name: String,
    pub segments: Vec<usize>,
}

/// Parsed script: segments in order plus the roster in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    pub segments: Vec<Segment>,
    pub roster: Vec<RosterEntry>,
}

impl Script {
    /// Character names in first-appearance order.
    pub fn characters(&self) -> Vec<&str> {
        self.roster.iter().map(|r| r.name.as_str()).collect()
    }

    /// Segment indices spoken by `character`, ascending.
    pub fn segments_for(&self, character: &str) -> &[usize] {
        self.roster
            .iter()
            .find(|r| r.name == character)
            .map(|r| r.segments.as_slice())
            .unwrap_or(&[])
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn edit_text(&mut self, index: usize, text: &str) -> Result<(), EditError> {
        self.segments
            .get_mut(index)
            .ok_or(EditError::UnknownSegment(index))?
            .set_text(text)
    }

    pub fn edit_language(&mut self, index: usize, language: &str) -> Result<(), EditError> {
        self.segments
            .get_mut(index)
            .ok_or(EditError::UnknownSegment(index))?
            .set_language(language);
        Ok(())
    }

    /// Apply one language to every segment.
    pub fn set_language_all(&mut self, language: &str) {
        for seg in &mut self.segments {
            seg.set_language(language);
        }
    }
}

pub fn language_name(code: &str) -> Option<&'static str> {
    KNOWN_LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}
