use crate::importer::{BookGroup, Record};
use crate::utils;
use chrono::Local;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct Frontmatter {
    created_date: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    authors: Option<Vec<String>>,
    tags: Vec<String>,
}

const DEFAULT_TAGS: &[&str] = &["books"];

/// Document head for a newly created full-book file: YAML frontmatter plus
/// the section scaffold the vault expects. Only written once, on creation;
/// appends never touch it.
pub fn write_book_head<W: Write>(
    writer: &mut W,
    group: &BookGroup,
    tags: Option<&[String]>,
) -> std::io::Result<()> {
    let fm = Frontmatter {
        created_date: Local::now().format("%Y-%m-%d").to_string(),
        title: group.title.clone(),
        authors: (!group.author.is_empty()).then(|| vec![group.author.clone()]),
        tags: match tags {
            Some(tags) => tags.to_vec(),
            None => DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
        },
    };

    writeln!(writer, "---")?;
    let yaml = serde_yaml::to_string(&fm)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;
    writeln!(writer, "## Summary")?;
    writeln!(writer)?;
    writeln!(writer, "## Highlights")?;
    writeln!(writer)?;
    Ok(())
}

/// Append-ready blocks for a full book's new clippings.
pub fn write_book_entries<W: Write>(writer: &mut W, records: &[&Record]) -> std::io::Result<()> {
    for record in records {
        write_entry(writer, record, None)?;
    }
    Ok(())
}

/// Fragment for the shared short-notes file: a setext header naming the
/// book, then the entries tagged with author and title so they stay
/// attributable inside the shared file.
pub fn write_short_fragment<W: Write>(
    writer: &mut W,
    group: &BookGroup,
    records: &[&Record],
) -> std::io::Result<()> {
    let heading = if group.author.is_empty() {
        group.title.clone()
    } else {
        format!("{} - {}", group.author, group.title)
    };
    writeln!(writer, "{}", heading)?;
    writeln!(writer, "{}", "-".repeat(heading.chars().count()))?;
    writeln!(writer)?;
    for record in records {
        write_entry(writer, record, Some(group))?;
    }
    Ok(())
}

/// One formatted clipping: marker, metadata line, quoted body, rule.
/// The marker is what lets the file double as the dedup index on the next
/// run (see [`utils::marker_hash`]).
fn write_entry<W: Write>(
    writer: &mut W,
    record: &Record,
    origin: Option<&BookGroup>,
) -> std::io::Result<()> {
    writeln!(writer, "{}", utils::entry_marker(&record.identity_hash))?;

    let mut meta = Vec::new();
    if !record.location.is_empty() {
        meta.push(record.location.clone());
    }
    let timestamp = utils::normalize_timestamp(&record.timestamp);
    if !timestamp.is_empty() {
        meta.push(timestamp);
    }
    if let Some(group) = origin {
        if !group.author.is_empty() {
            meta.push(group.author.clone());
        }
        meta.push(group.title.clone());
    }
    if !meta.is_empty() {
        writeln!(writer, "{}", meta.join(" ; "))?;
    }

    for line in record.body.lines() {
        writeln!(writer, "> {}", line)?;
    }
    writeln!(writer, "---")?;
    writeln!(writer)?;
    Ok(())
}
