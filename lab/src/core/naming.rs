//! Names of files derived from the working file, plus text helpers.

/// Base name without its final extension (`app.py` -> `app`).
pub fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(0) | None => filename,
        Some(idx) => &filename[..idx],
    }
}

/// Final extension including the dot, or `.py` when the name has none.
fn extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(0) | None => ".py",
        Some(idx) => &filename[idx..],
    }
}

/// Module name tests import from: the stem of the working file.
pub fn module_name(filename: &str) -> &str {
    file_stem(filename)
}

pub fn critic_file_name(filename: &str) -> String {
    format!("{}_critic{}", file_stem(filename), extension(filename))
}

pub fn cleaned_file_name(filename: &str) -> String {
    format!("{}_cleaned{}", file_stem(filename), extension(filename))
}

pub fn test_file_name(filename: &str) -> String {
    format!("test_{}{}", file_stem(filename), extension(filename))
}

/// Whether `filename` is a plain base name usable inside a session directory.
pub fn is_valid_filename(filename: &str) -> bool {
    let stem = file_stem(filename);
    !filename.trim().is_empty()
        && filename.len() <= 255
        && !filename.contains(['/', '\\', '\0'])
        && filename != "."
        && filename != ".."
        && !stem.is_empty()
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// `text` cut to `max_chars` with a trailing ellipsis when shortened.
pub fn preview(text: &str, max_chars: usize) -> String {
    let head = truncate_chars(text, max_chars);
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        head.to_string()
    }
}
