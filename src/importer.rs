//! Parser for the Kindle "My Clippings.txt" export format.
//!
//! The file is a flat, append-only sequence of records separated by a
//! delimiter line of repeated `=` characters:
//!
//! ```text
//! Dune (Frank Herbert)
//! - Your Highlight on page 4 | location 104-105 | Added on Tuesday, January 16, 2024 10:23:45 AM
//!
//! Fear is the mind-killer.
//! ==========
//! ```
//!
//! The format is undocumented and varies by firmware and locale ("on Page
//! 4", "at location 104-109", translated kind words, differing date
//! formats). Parsing is therefore tolerant: a record is never dropped
//! because its metadata line could only be partially understood, and junk
//! blocks (such as the empty block after the final delimiter) are skipped.

use crate::utils;
use std::collections::HashMap;

/// Books with at least this many clippings get their own file; smaller ones
/// are collected into the shared short-notes file.
pub const FULL_BOOK_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClippingKind {
    Highlight,
    Note,
    Bookmark,
}

impl ClippingKind {
    fn from_metadata_word(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("highlight") {
            Some(Self::Highlight)
        } else if word.eq_ignore_ascii_case("note") {
            Some(Self::Note)
        } else if word.eq_ignore_ascii_case("bookmark") {
            Some(Self::Bookmark)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highlight => "Highlight",
            Self::Note => "Note",
            Self::Bookmark => "Bookmark",
        }
    }
}

/// One highlight, note or bookmark from the clippings file.
///
/// `location` and `timestamp` are kept as the device printed them; only the
/// fields that define a clipping's identity are normalized, inside
/// [`utils::identity_hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub book_title: String,
    pub author: String,
    pub kind: ClippingKind,
    pub location: String,
    pub timestamp: String,
    pub body: String,
    pub identity_hash: String,
}

/// Lazily parse the clippings text into records. The whole file is re-read
/// on every run; nothing is carried over between runs.
pub fn parse_clippings(text: &str) -> impl Iterator<Item = Record> + '_ {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    RecordBlocks {
        lines: text.lines(),
        done: false,
    }
    .filter_map(|block| parse_block(&block))
}

struct RecordBlocks<'a> {
    lines: std::str::Lines<'a>,
    done: bool,
}

impl<'a> Iterator for RecordBlocks<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut block = Vec::new();
        loop {
            match self.lines.next() {
                None => {
                    self.done = true;
                    return if block.is_empty() { None } else { Some(block) };
                }
                Some(line) if is_delimiter(line) => return Some(block),
                Some(line) => block.push(line),
            }
        }
    }
}

/// The device writes exactly ten `=` characters; accept any all-`=` line.
fn is_delimiter(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 5 && line.bytes().all(|b| b == b'=')
}

fn parse_block(lines: &[&str]) -> Option<Record> {
    let mut idx = 0;
    while idx < lines.len() && lines[idx].trim().is_empty() {
        idx += 1;
    }
    let (book_title, author) = parse_title_line(lines.get(idx)?);
    if book_title.is_empty() {
        return None;
    }

    let (kind, location, timestamp) = match lines.get(idx + 1) {
        Some(meta) => parse_metadata_line(meta),
        None => (ClippingKind::Highlight, String::new(), String::new()),
    };

    let body = lines
        .get(idx + 2..)
        .unwrap_or(&[])
        .iter()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .replace("  ", " ");

    let identity_hash = utils::identity_hash(&book_title, &location, kind.as_str(), &body);

    Some(Record {
        book_title,
        author,
        kind,
        location,
        timestamp,
        body,
        identity_hash,
    })
}

/// Split `Title (Author)` on the *last* parenthesized group; titles may
/// themselves contain parentheses. No trailing group leaves the author
/// empty rather than failing.
fn parse_title_line(line: &str) -> (String, String) {
    let line = line.trim_matches('\u{feff}').trim();
    if let Some(stripped) = line.strip_suffix(')')
        && let Some(open) = stripped.rfind('(')
    {
        let title = stripped[..open].trim();
        if !title.is_empty() {
            return (title.to_string(), stripped[open + 1..].trim().to_string());
        }
    }
    (line.to_string(), String::new())
}

/// Parse `- Your <Kind> on <location> | Added on <timestamp>`.
/// Every piece is optional in practice; missing pieces come back empty and
/// an unrecognized kind word keeps the record as a highlight.
fn parse_metadata_line(line: &str) -> (ClippingKind, String, String) {
    let line = line.trim();
    let rest = line.strip_prefix("- ").unwrap_or(line);
    let rest = rest.strip_prefix("Your ").unwrap_or(rest);

    let (rest, timestamp) = match rest.rsplit_once("Added on") {
        Some((left, ts)) => (
            left.trim_end().trim_end_matches('|').trim_end(),
            ts.trim().to_string(),
        ),
        None => (rest, String::new()),
    };

    let (kind, location) = match rest.split_once(char::is_whitespace) {
        Some((word, loc)) => (
            ClippingKind::from_metadata_word(word).unwrap_or(ClippingKind::Highlight),
            loc,
        ),
        None => (
            ClippingKind::from_metadata_word(rest).unwrap_or(ClippingKind::Highlight),
            "",
        ),
    };

    let location = location.trim();
    let location = location
        .strip_prefix("on ")
        .or_else(|| location.strip_prefix("at "))
        .unwrap_or(location)
        .trim()
        .to_string();

    (kind, location, timestamp)
}

/// All clippings for one publication, in file order.
#[derive(Debug, Clone)]
pub struct BookGroup {
    pub title: String,
    pub author: String,
    pub records: Vec<Record>,
}

impl BookGroup {
    /// Full books get their own file; anything smaller lands in the shared
    /// short-notes file. Classified on the current parse of the whole file,
    /// which is cumulative on the device.
    pub fn is_full(&self) -> bool {
        self.records.len() >= FULL_BOOK_THRESHOLD
    }
}

/// Group records by (title, author), preserving first-seen order of the
/// groups and of the records within each group.
pub fn group_records<I: IntoIterator<Item = Record>>(records: I) -> Vec<BookGroup> {
    let mut groups: Vec<BookGroup> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for record in records {
        let key = (record.book_title.clone(), record.author.clone());
        match index.get(&key) {
            Some(&i) => groups[i].records.push(record),
            None => {
                index.insert(key, groups.len());
                groups.push(BookGroup {
                    title: record.book_title.clone(),
                    author: record.author.clone(),
                    records: vec![record],
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEP: &str = "==========";

    #[test]
    fn parses_a_wellformed_highlight() {
        let text = format!(
            "Dune (Frank Herbert)\n\
             - Your Highlight on page 4 | location 104-105 | Added on Tuesday, January 16, 2024 10:23:45 AM\n\
             \n\
             Fear is the mind-killer.\n\
             {SEP}\n"
        );
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.book_title, "Dune");
        assert_eq!(r.author, "Frank Herbert");
        assert_eq!(r.kind, ClippingKind::Highlight);
        assert_eq!(r.location, "page 4 | location 104-105");
        assert_eq!(r.timestamp, "Tuesday, January 16, 2024 10:23:45 AM");
        assert_eq!(r.body, "Fear is the mind-killer.");
        assert_eq!(r.identity_hash.len(), 16);
    }

    #[test]
    fn title_parentheses_belong_to_title_not_author() {
        let (title, author) = parse_title_line("A Study in Scarlet (Annotated) (Arthur Conan Doyle)");
        assert_eq!(title, "A Study in Scarlet (Annotated)");
        assert_eq!(author, "Arthur Conan Doyle");
    }

    #[test]
    fn missing_author_is_empty() {
        let (title, author) = parse_title_line("Some Device Manual");
        assert_eq!(title, "Some Device Manual");
        assert_eq!(author, "");
    }

    #[test]
    fn bom_is_stripped_from_title() {
        let text = format!(
            "\u{feff}Dune (Frank Herbert)\n- Your Bookmark on page 4 | Added on x\n\n{SEP}\n"
        );
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records[0].book_title, "Dune");
    }

    #[test]
    fn note_and_bookmark_kinds() {
        let text = format!(
            "Dune (Frank Herbert)\n\
             - Your Note on page 9 | Added on Tuesday, January 16, 2024 10:30:00 AM\n\
             \n\
             He who controls the spice.\n\
             {SEP}\n\
             Dune (Frank Herbert)\n\
             - Your Bookmark at location 200 | Added on Tuesday, January 16, 2024 10:31:00 AM\n\
             \n\
             {SEP}\n"
        );
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ClippingKind::Note);
        assert_eq!(records[1].kind, ClippingKind::Bookmark);
        assert_eq!(records[1].location, "location 200");
        assert_eq!(records[1].body, "");
    }

    #[test]
    fn missing_added_on_yields_empty_timestamp() {
        let text = format!(
            "Dune (Frank Herbert)\n- Your Highlight on location 300-301\n\nA beginning is a very delicate time.\n{SEP}\n"
        );
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, "");
        assert_eq!(records[0].location, "location 300-301");
        assert_eq!(records[0].body, "A beginning is a very delicate time.");
    }

    #[test]
    fn unrecognized_kind_word_keeps_the_record() {
        let text =
            format!("Dune (Frank Herbert)\n- Your Clip on page 2 | Added on x\n\nsome text\n{SEP}\n");
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ClippingKind::Highlight);
        assert_eq!(records[0].location, "page 2");
    }

    #[test]
    fn garbled_metadata_line_keeps_the_record() {
        let text = format!("Dune (Frank Herbert)\nnot a metadata line at all\n\nbody\n{SEP}\n");
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ClippingKind::Highlight);
        assert_eq!(records[0].body, "body");
    }

    #[test]
    fn empty_and_trailing_blocks_are_skipped() {
        let text = format!(
            "Dune (Frank Herbert)\n- Your Highlight on page 1 | Added on x\n\nfirst\n{SEP}\n{SEP}\n\n"
        );
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn multiline_body_is_preserved() {
        let text = format!(
            "Dune (Frank Herbert)\n- Your Highlight on page 7 | Added on x\n\nfirst line\nsecond line\n{SEP}\n"
        );
        let records: Vec<Record> = parse_clippings(&text).collect();
        assert_eq!(records[0].body, "first line\nsecond line");
    }

    #[test]
    fn identity_ignores_position_in_file() {
        let one = format!("Dune (Frank Herbert)\n- Your Highlight on page 4 | Added on x\n\nsame text\n{SEP}\n");
        let other = format!(
            "Other (Someone)\n- Your Highlight on page 1 | Added on y\n\nunrelated\n{SEP}\n{one}"
        );
        let a: Vec<Record> = parse_clippings(&one).collect();
        let b: Vec<Record> = parse_clippings(&other).collect();
        assert_eq!(a[0].identity_hash, b[1].identity_hash);
    }

    #[test]
    fn grouping_preserves_order_and_counts() {
        let text = format!(
            "Dune (Frank Herbert)\n- Your Highlight on page 1 | Added on x\n\none\n{SEP}\n\
             Short Story (Jane Doe)\n- Your Highlight on page 2 | Added on x\n\ntwo\n{SEP}\n\
             Dune (Frank Herbert)\n- Your Highlight on page 3 | Added on x\n\nthree\n{SEP}\n"
        );
        let groups = group_records(parse_clippings(&text));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].title, "Dune");
        assert_eq!(groups[0].records.len(), 2);
        assert_eq!(groups[0].records[0].body, "one");
        assert_eq!(groups[0].records[1].body, "three");
        assert_eq!(groups[1].title, "Short Story");
        assert!(!groups[0].is_full());
    }

    #[test]
    fn threshold_is_three() {
        let two = format!(
            "Dune (Frank Herbert)\n- Your Highlight on page 1 | Added on x\n\none\n{SEP}\n\
             Dune (Frank Herbert)\n- Your Highlight on page 2 | Added on x\n\ntwo\n{SEP}\n"
        );
        let groups = group_records(parse_clippings(&two));
        assert!(!groups[0].is_full());

        let three = format!(
            "{two}Dune (Frank Herbert)\n- Your Highlight on page 3 | Added on x\n\nthree\n{SEP}\n"
        );
        let groups = group_records(parse_clippings(&three));
        assert!(groups[0].is_full());
    }

    #[test]
    fn same_title_different_author_are_distinct_books() {
        let text = format!(
            "Collected Poems (A. Poet)\n- Your Highlight on page 1 | Added on x\n\none\n{SEP}\n\
             Collected Poems (B. Poet)\n- Your Highlight on page 1 | Added on x\n\ntwo\n{SEP}\n"
        );
        let groups = group_records(parse_clippings(&text));
        assert_eq!(groups.len(), 2);
    }
}
