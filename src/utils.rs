use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone)]
pub struct ExportConfig {
    pub input_file: std::path::PathBuf,
    pub output_dir: std::path::PathBuf,
    pub tags: Option<Vec<String>>,
    pub verbose: bool,
    pub quiet: bool,
}

#[derive(Clone, Copy)]
pub enum ProcessResult {
    Created,
    Appended,
    Skipped,
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic fingerprint of a clipping's content, used as the dedup key.
///
/// Hashes the whitespace-normalized (title, location, kind, body) tuple with
/// a field separator so boundaries cannot alias. The timestamp is excluded:
/// the identity of a highlight is what was marked and where, not when the
/// device printed it. 16 hex chars keep the embedded marker short.
pub fn identity_hash(title: &str, location: &str, kind: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [title, location, kind, body] {
        hasher.update(normalize_ws(field).as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Render the marker line that embeds a clipping's identity in the file.
/// HTML comments are invisible in rendered Markdown, so the marker rides
/// along with each entry without disturbing the reading view.
pub fn entry_marker(hash: &str) -> String {
    format!("<!-- clip:{} -->", hash)
}

/// Extract the identity hash from a marker line, if this line is one.
pub fn marker_hash(line: &str) -> Option<&str> {
    let inner = line
        .trim()
        .strip_prefix("<!-- clip:")?
        .strip_suffix("-->")?
        .trim();
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(inner)
    } else {
        None
    }
}

/// Recover the set of identity hashes already emitted into an output file.
/// The file itself is the index; no sidecar state exists between runs.
pub fn scan_existing_hashes(path: &Path) -> std::io::Result<HashSet<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut hashes = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(hash) = marker_hash(&line) {
            hashes.insert(hash.to_string());
        }
    }
    Ok(hashes)
}

/// Derive a short display title. Kindle titles often carry subtitle and
/// edition noise after "|", " - " or ". ".
pub fn short_title(title: &str) -> &str {
    let mut short = title;
    for sep in ["|", " - ", ". "] {
        if let Some(idx) = short.find(sep) {
            short = &short[..idx];
        }
    }
    let short = short.trim();
    match short.char_indices().nth(128) {
        Some((idx, _)) => &short[..idx],
        None => short,
    }
}

/// Allocate the Markdown filename for a full book from its author and title.
pub fn book_filename(author: &str, title: &str) -> String {
    let raw_slug = slug::slugify(format!("{} {}", author, short_title(title)));
    // Truncate slug to 60 chars (slug output is ASCII-only, so byte == char)
    let stem = raw_slug[..raw_slug.len().min(60)].trim_end_matches('-');
    if stem.is_empty() {
        "untitled.md".to_string()
    } else {
        format!("{}.md", stem)
    }
}

/// Date formats the device prints, by firmware locale.
const TIMESTAMP_FORMATS: &[&str] = &[
    // "Tuesday, January 16, 2024 10:23:45 AM"
    "%A, %B %d, %Y %I:%M:%S %p",
    // "Thursday, 15 August 2024 10:23:45"
    "%A, %d %B %Y %H:%M:%S",
    // Older firmware drops the weekday
    "%B %d, %Y %I:%M:%S %p",
];

/// Best-effort normalization of the device's printed timestamp.
/// Unrecognized locales keep the raw string; dates are display metadata
/// only and never feed the identity hash.
pub fn normalize_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return dt.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }
    raw.to_string()
}
