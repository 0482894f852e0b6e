use regex::Regex;
use std::sync::OnceLock;

use super::{ParseError, RosterEntry, Script, Segment};

fn speaker_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Name is everything up to the first colon.
    RE.get_or_init(|| Regex::new(r"^([^:]*):(.*)$").expect("static regex"))
}

/// Parse `Character: dialogue` text into segments and a roster.
///
/// Lines without a colon continue the previous segment's dialogue. Blank lines
/// are ignored. Any newline convention is accepted.
pub fn parse(text: &str) -> Result<Script, ParseError> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<(usize, &str)> = normalized
        .split('\n')
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut segments: Vec<Segment> = Vec::new();
    let mut roster: Vec<RosterEntry> = Vec::new();
    let mut current: Option<(String, String)> = None;

    for (line_no, line) in lines {
        match speaker_line_re().captures(line) {
            Some(cap) => {
                let name = cap[1].trim();
                let dialogue = cap[2].trim();
                if name.is_empty() {
                    return Err(ParseError::EmptyCharacterName { line: line_no });
                }
                if dialogue.is_empty() {
                    return Err(ParseError::EmptyDialogue { line: line_no });
                }
                if let Some((character, text)) = current.take() {
                    push_segment(&mut segments, &mut roster, character, text);
                }
                current = Some((name.to_string(), dialogue.to_string()));
            }
            None => match current.as_mut() {
                Some((_, text)) => {
                    text.push(' ');
                    text.push_str(line);
                }
                None => return Err(ParseError::MalformedLine { line: line_no }),
            },
        }
    }

    if let Some((character, text)) = current.take() {
        push_segment(&mut segments, &mut roster, character, text);
    }

    if roster.len() < 2 {
        return Err(ParseError::TooFewCharacters { found: roster.len() });
    }

    Ok(Script { segments, roster })
}

fn push_segment(
    segments: &mut Vec<Segment>,
    roster: &mut Vec<RosterEntry>,
    character: String,
    text: String,
) {
    let index = segments.len();
    match roster.iter_mut().find(|r| r.name == character) {
        Some(entry) => entry.segments.push(index),
        None => roster.push(RosterEntry {
            name: character.clone(),
            segments: vec![index],
        }),
    }
    segments.push(Segment::new(index, character, text));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_dialogue() {
        let script = parse("Alice: Hello!\nBob: Hi Alice.\nAlice: How are you?").unwrap();
        assert_eq!(script.segments.len(), 3);
        assert_eq!(script.characters(), vec!["Alice", "Bob"]);
        assert_eq!(script.segments[2].character, "Alice");
        assert_eq!(script.segments[2].text, "How are you?");
        assert_eq!(script.segments[2].language, "en");
        for seg in &script.segments {
            assert!(script.characters().contains(&seg.character.as_str()));
        }
    }

    #[test]
    fn continuation_lines_join_previous_segment() {
        let script = parse("A: hello\nworld\nB: hi").unwrap();
        assert_eq!(script.segments.len(), 2);
        assert_eq!(script.segments[0].character, "A");
        assert_eq!(script.segments[0].text, "hello world");
        assert_eq!(script.segments[1].character, "B");
        assert_eq!(script.segments[1].text, "hi");
    }

    #[test]
    fn accepts_crlf_and_blank_lines() {
        let script = parse("\r\nA: one\r\n\r\n  B:  two  \rA: three\n\n").unwrap();
        let texts: Vec<&str> = script.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(script.segments_for("A"), &[0, 2]);
    }

    #[test]
    fn name_stops_at_first_colon() {
        let script = parse("Dr. Who: time: relative\nRiver: spoilers").unwrap();
        assert_eq!(script.segments[0].character, "Dr. Who");
        assert_eq!(script.segments[0].text, "time: relative");
    }

    #[test]
    fn roster_keeps_first_appearance_order() {
        let script = parse("Zed: a\nAmy: b\nMo: c\nAmy: d").unwrap();
        assert_eq!(script.characters(), vec!["Zed", "Amy", "Mo"]);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("  \n\t\n  "), Err(ParseError::Empty));
    }

    #[test]
    fn single_character_is_rejected() {
        assert_eq!(parse("A: hi"), Err(ParseError::TooFewCharacters { found: 1 }));
        assert_eq!(
            parse("A: hi\nA: again"),
            Err(ParseError::TooFewCharacters { found: 1 })
        );
    }

    #[test]
    fn leading_line_without_speaker_is_malformed() {
        assert_eq!(
            parse("\nno speaker here\nA: hi\nB: yo"),
            Err(ParseError::MalformedLine { line: 2 })
        );
    }

    #[test]
    fn empty_name_or_dialogue_is_rejected() {
        assert_eq!(
            parse("A: hi\n  : orphan"),
            Err(ParseError::EmptyCharacterName { line: 2 })
        );
        assert_eq!(
            parse("A: hi\nB:   "),
            Err(ParseError::EmptyDialogue { line: 2 })
        );
    }

    #[test]
    fn parsing_is_repeatable() {
        let text = "Host: Welcome back.\nGuest: Thanks\nfor having me.\nHost: Let's start.";
        assert_eq!(parse(text).unwrap(), parse(text).unwrap());
    }
}
