use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use super::files::WrittenFile;
use crate::pipeline::MissingSegment;
use crate::script::Script;

/// Pretty-print any serializable value as JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Parsed script as `{characters, segments, roster}`.
pub fn script_value(script: &Script) -> Value {
    json!({
        "characters": script.characters(),
        "segments": script.segments,
        "roster": script.roster,
    })
}

/// Outcome of `generate`: files written plus what is still missing.
pub fn run_value(files: &[WrittenFile], missing: &[MissingSegment], error: Option<&str>) -> Value {
    json!({
        "ok": error.is_none(),
        "error": error,
        "files": files,
        "missing": missing,
    })
}
