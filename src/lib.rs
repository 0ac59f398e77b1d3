//! # kindle-clippings-export
//!
//! A CLI tool that converts the Kindle "My Clippings.txt" export into one
//! Markdown file per book, ready for an Obsidian-style note vault.
//!
//! ## What it does
//!
//! The Kindle appends every highlight, note and bookmark to a single
//! `My Clippings.txt` file on the device. This tool parses that file, groups
//! the clippings by book, and writes each book with three or more clippings
//! to its own Markdown file with YAML frontmatter. Books with fewer
//! clippings are collected into a shared `short_notes.md`.
//!
//! ## Incremental export
//!
//! On repeated runs, existing files are scanned for the identity markers
//! embedded next to each entry, and only clippings whose marker is absent
//! are appended. Everything already in a file — including your own edits —
//! is left byte-for-byte untouched. The Markdown files themselves are the
//! only state; there is no sidecar index.
//!
//! ## Usage
//!
//! ```sh
//! # Pick up "My Clippings.txt" from the current directory or a plugged-in Kindle
//! kindle-clippings-export -o ~/notes/clippings
//!
//! # Non-interactive, with custom frontmatter tags
//! kindle-clippings-export "My Clippings.txt" --all --tags books,kindle
//! ```
//!
//! Preferences can be persisted in `~/.config/kindle-clippings-export/config.toml`.

pub mod exporter;
pub mod importer;
pub mod process;
pub mod utils;
