use std::{env, fs, io::Write, process::Command};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

const DEFAULT_EDITOR: &str = "vim";

/// Lets the user edit `initial` in `$EDITOR` and returns the saved text.
pub fn edit_text(initial: &str) -> Result<String> {
    let editor = env::var("EDITOR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
    edit_text_with(&editor, initial)
}

/// `editor` may carry arguments, e.g. `code --wait`. The file is removed once read.
pub fn edit_text_with(editor: &str, initial: &str) -> Result<String> {
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("Editor command is empty"))?;

    let mut file = tempfile::Builder::new()
        .prefix("kkzm_")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create temporary file")?;
    file.write_all(initial.as_bytes())?;
    file.flush()?;

    debug!("Running {editor} on {}", file.path().display());
    let status = Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to run editor {program}"))?;
    if !status.success() {
        bail!("Editor {program} exited with {status}");
    }

    fs::read_to_string(file.path()).context("Failed to read edited file")
}

/// The three lines of an edited kizami.
#[derive(Debug, PartialEq, Eq)]
pub struct EditedFields {
    pub desc: String,
    pub started_at: String,
    pub stopped_at: String,
}

/// Splits editor text into description, start and stop lines. Anything after the third line is
/// ignored.
pub fn parse_edited_fields(text: &str) -> Result<EditedFields> {
    let mut lines = text.lines().map(|v| v.trim_end_matches('\r'));
    match (lines.next(), lines.next(), lines.next()) {
        (Some(desc), Some(started_at), Some(stopped_at)) => Ok(EditedFields {
            desc: desc.to_string(),
            started_at: started_at.to_string(),
            stopped_at: stopped_at.to_string(),
        }),
        _ => bail!("Expected three lines: description, started at and stopped at"),
    }
}

/// First line of editor text, used as a new description.
pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim_end_matches('\r')
}
