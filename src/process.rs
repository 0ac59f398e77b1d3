use crate::exporter;
use crate::importer::{self, BookGroup, Record};
use crate::utils::{self, ExportConfig, ProcessResult};
use eyre::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Shared file that collects books below the full-book threshold.
pub const SHORT_NOTES_FILE: &str = "short_notes.md";

/// Outcome counts for one run, reported in the final summary line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub appended: usize,
    pub skipped: usize,
    pub errors: usize,
    pub new_clippings: usize,
}

/// Read and parse the clippings file into per-book groups.
/// This is the only I/O failure that is fatal to the whole run.
pub fn load_books(config: &ExportConfig) -> Result<Vec<BookGroup>> {
    let text = fs::read_to_string(&config.input_file).wrap_err_with(|| {
        format!(
            "Failed to read clippings file: {}",
            config.input_file.display()
        )
    })?;
    Ok(importer::group_records(importer::parse_clippings(&text)))
}

/// Merge new clippings into the output directory.
///
/// `selection` restricts the run to the named book titles; `None` processes
/// every book. A book whose clippings are all already on disk is skipped
/// without touching its file, and per-book failures are reported and
/// counted but do not stop the remaining books.
pub fn export_books(
    config: &ExportConfig,
    books: &[BookGroup],
    selection: Option<&HashSet<String>>,
) -> Result<RunSummary> {
    fs::create_dir_all(&config.output_dir).wrap_err_with(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    let mut summary = RunSummary::default();

    for group in books {
        if let Some(selected) = selection
            && !selected.contains(&group.title)
        {
            continue;
        }
        match export_book(config, group) {
            Ok((ProcessResult::Created, n)) => {
                summary.created += 1;
                summary.new_clippings += n;
            }
            Ok((ProcessResult::Appended, n)) => {
                summary.appended += 1;
                summary.new_clippings += n;
            }
            Ok((ProcessResult::Skipped, _)) => summary.skipped += 1,
            Err(e) => {
                summary.errors += 1;
                eprintln!("Error [{}]: {:#}", group.title, e);
            }
        }
    }

    if !config.quiet {
        let mut line = format!(
            "Done. {} new clippings: {} files created, {} appended, {} books unchanged.",
            summary.new_clippings, summary.created, summary.appended, summary.skipped
        );
        if summary.errors > 0 {
            line.push_str(&format!(" Completed with {} error(s).", summary.errors));
        }
        eprintln!("{}", line);
    }

    Ok(summary)
}

fn export_book(config: &ExportConfig, group: &BookGroup) -> Result<(ProcessResult, usize)> {
    let path = if group.is_full() {
        config
            .output_dir
            .join(utils::book_filename(&group.author, &group.title))
    } else {
        config.output_dir.join(SHORT_NOTES_FILE)
    };

    // The target file is the index: whatever hashes it carries have been
    // emitted before. Scoped per file so a book that crosses the full-book
    // threshold starts its own file from scratch, old short-notes entries
    // notwithstanding.
    let seen = match utils::scan_existing_hashes(&path) {
        Ok(hashes) => hashes,
        Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
        Err(e) => {
            eprintln!(
                "Warning: could not scan {}: {}; treating all clippings as new",
                path.display(),
                e
            );
            HashSet::new()
        }
    };

    let new_records: Vec<&Record> = group
        .records
        .iter()
        .filter(|r| !r.body.is_empty() && !seen.contains(&r.identity_hash))
        .collect();

    if new_records.is_empty() {
        if config.verbose {
            eprintln!("Skipped:  {}", file_label(&path));
        }
        return Ok((ProcessResult::Skipped, 0));
    }

    let existing = match fs::read(&path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).wrap_err_with(|| format!("Failed to read: {}", path.display()));
        }
    };

    // Existing content, manual edits included, is carried over verbatim;
    // new entries only ever land after it.
    let mut buf: Vec<u8> = Vec::new();
    let result = match &existing {
        Some(bytes) => {
            buf.extend_from_slice(bytes);
            if !bytes.is_empty() && !bytes.ends_with(b"\n") {
                buf.push(b'\n');
            }
            ProcessResult::Appended
        }
        None => ProcessResult::Created,
    };

    if group.is_full() {
        if existing.is_none() {
            exporter::write_book_head(&mut buf, group, config.tags.as_deref())?;
        }
        exporter::write_book_entries(&mut buf, &new_records)?;
    } else {
        exporter::write_short_fragment(&mut buf, group, &new_records)?;
    }

    write_atomic(&path, &config.output_dir, &buf)
        .wrap_err_with(|| format!("Failed to write: {}", path.display()))?;

    if config.verbose {
        let label = match result {
            ProcessResult::Created => "Created: ",
            ProcessResult::Appended => "Appended:",
            ProcessResult::Skipped => unreachable!(),
        };
        eprintln!("{} {} ({} new)", label, file_label(&path), new_records.len());
    }

    Ok((result, new_records.len()))
}

/// Stage the complete new content in a temp file next to the target, then
/// rename over it. A crashed run leaves either the old file or the new one
/// on disk, never a torn append.
fn write_atomic(path: &Path, dir: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
