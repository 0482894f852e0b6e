use std::path::Path;
use std::time::Duration;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::files::WrittenFile;
use crate::pipeline::MissingSegment;
use crate::script::{Script, KNOWN_LANGUAGES};
use crate::services::Voice;

/// Format duration in seconds to human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let m = total / 60;
    let s = total % 60;
    if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{:.1}s", seconds)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Pad to a display width; `format!` pads by chars, which misaligns wide glyphs.
fn pad(s: &str, width: usize) -> String {
    let s = truncate(s, width);
    let fill = width.saturating_sub(UnicodeWidthStr::width(s.as_str()));
    format!("{s}{}", " ".repeat(fill))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Print segments and roster for `videocast parse`.
pub fn print_script(script: &Script) {
    println!(
        "{} segment{}, {} character{}:\n",
        script.segments.len(),
        plural(script.segments.len()),
        script.roster.len(),
        plural(script.roster.len())
    );

    println!("  {:<4} {} {:<5} TEXT", "#", pad("CHARACTER", 16), "LANG");
    println!("  {}", "-".repeat(76));
    for seg in &script.segments {
        println!(
            "  {:<4} {} {:<5} {}",
            seg.index + 1,
            pad(&seg.character, 16),
            seg.language,
            truncate(&seg.text, 48)
        );
    }

    println!("\nRoster:");
    for entry in &script.roster {
        let lines: Vec<String> = entry.segments.iter().map(|i| (i + 1).to_string()).collect();
        println!("  {} lines {}", pad(&entry.name, 16), lines.join(", "));
    }
}

pub fn print_voices(voices: &[Voice]) {
    if voices.is_empty() {
        println!("No voices available.");
        return;
    }

    println!("{} voice{}:\n", voices.len(), plural(voices.len()));
    println!("  {} {:<26} CATEGORY", pad("NAME", 24), "VOICE ID");
    println!("  {}", "-".repeat(66));
    for v in voices {
        println!(
            "  {} {:<26} {}",
            pad(&v.name, 24),
            v.voice_id,
            v.category.as_deref().unwrap_or("-")
        );
    }
}

/// Summary of a `generate` run: files written, then anything missing.
pub fn print_run_report(files: &[WrittenFile], missing: &[MissingSegment]) {
    if files.is_empty() {
        println!("No files written.");
    } else {
        println!("Wrote {} file{}:", files.len(), plural(files.len()));
        for f in files {
            let what = match f.segment {
                Some(i) => format!("#{} {}", i + 1, f.label),
                None => f.label.to_string(),
            };
            println!(
                "  {} {:>10}  {}",
                pad(&what, 16),
                format_bytes(f.bytes),
                f.path.display()
            );
        }
    }

    if !missing.is_empty() {
        println!("\nMissing {} segment{}:", missing.len(), plural(missing.len()));
        for m in missing {
            println!(
                "  #{:<3} {} {}",
                m.index + 1,
                pad(&m.character, 16),
                truncate(&m.text, 52)
            );
        }
    }
}

/// One-line header for `generate`. `only` is a 0-based segment index.
pub fn run_banner(only: Option<usize>, total: usize, dir: &Path, max_wait: Duration) -> String {
    let what = match only {
        Some(index) => format!("line {} of {total}", index + 1),
        None => format!("{total} line{}", plural(total)),
    };
    format!(
        "Generating {what} into {} (each video waits up to {})",
        dir.display(),
        format_duration(max_wait.as_secs_f64())
    )
}

pub fn print_languages() {
    let codes: Vec<String> = KNOWN_LANGUAGES
        .iter()
        .map(|(code, name)| format!("{code} ({name})"))
        .collect();
    println!("Languages: {}", codes.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_display_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("日本語のテキスト", 9), "日本語...");
    }

    #[test]
    fn pad_uses_display_width() {
        assert_eq!(pad("日本", 6), "日本  ");
        assert_eq!(pad("ab", 4), "ab  ");
    }

    #[test]
    fn banner_names_output_dir_and_poll_budget() {
        let banner = run_banner(None, 3, Path::new("out"), Duration::from_secs(125));
        assert_eq!(banner, "Generating 3 lines into out (each video waits up to 2m05s)");

        let banner = run_banner(Some(0), 3, Path::new("out"), Duration::from_millis(30));
        assert!(banner.starts_with("Generating line 1 of 3 into out"));
    }

    #[test]
    fn durations_and_sizes() {
        assert_eq!(format_duration(4.3), "4.3s");
        assert_eq!(format_duration(125.0), "2m05s");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
