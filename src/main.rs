use clap::Parser;
use eyre::{Context, Result, eyre};
use kindle_clippings_export::process;
use kindle_clippings_export::utils::ExportConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Convert a Kindle "My Clippings.txt" export into per-book Markdown files.
/// Re-runs append only the clippings that are not already in the output.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the "My Clippings.txt" file.
    /// Searched in the current directory and on a mounted Kindle if omitted.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory to write per-book Markdown files.
    /// Defaults to ./clippings if not set in config.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/kindle-clippings-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Comma-separated tags for new files' frontmatter (e.g. "books,kindle").
    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Process every book, skipping the interactive selection prompt.
    #[arg(long)]
    all: bool,

    /// Print each file written or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the run summary.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    input_file: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    tags: Option<Vec<String>>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("kindle-clippings-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

/// Candidate locations for the clippings file when none is given:
/// the working directory, then the usual Kindle mount points.
fn default_input_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("My Clippings.txt")];
    if let Ok(user) = std::env::var("USER") {
        candidates.push(
            Path::new("/media")
                .join(user)
                .join("Kindle/documents/My Clippings.txt"),
        );
    }
    candidates.push(PathBuf::from("/Volumes/Kindle/documents/My Clippings.txt"));
    candidates
}

fn resolve_input(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(eyre!("Clippings file not found: {}", path.display()));
        }
        return Ok(path);
    }
    default_input_candidates()
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
            eyre!(
                "Could not find \"My Clippings.txt\".\nPass the file location as an argument, or plug in the Kindle."
            )
        })
}

/// Numbered menu over the unique book titles; `0` selects everything.
/// Returns `None` for "all books" so the core never sees the prompt.
fn prompt_book_selection(titles: &[String]) -> Result<Option<HashSet<String>>> {
    println!("\nSelect a book (or books) to output:");
    println!("[0]: All books");
    for (i, title) in titles.iter().enumerate() {
        println!("[{}]: {}", i + 1, title);
    }

    loop {
        print!("\nInput one or more numbers, separated by a space: ");
        io::stdout().flush().wrap_err("Failed to flush stdout")?;
        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .wrap_err("Failed to read selection")?;
        if read == 0 {
            // EOF on stdin behaves like selecting everything
            return Ok(None);
        }

        let Ok(numbers) = line
            .split_whitespace()
            .map(str::parse::<usize>)
            .collect::<std::result::Result<Vec<_>, _>>()
        else {
            println!("Please enter valid numbers separated by spaces");
            continue;
        };
        if numbers.is_empty() {
            println!("Please enter at least one number");
            continue;
        }
        if numbers.contains(&0) {
            return Ok(None);
        }
        if numbers.iter().any(|&n| n > titles.len()) {
            println!("Please enter numbers between 0 and {}", titles.len());
            continue;
        }
        return Ok(Some(
            numbers.into_iter().map(|n| titles[n - 1].clone()).collect(),
        ));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve the input file (CLI > Config > Search)
    let input_file = resolve_input(cli.input.or(file_cfg.input_file))?;

    // 3. Resolve the output directory (CLI > Config > Default)
    let output_dir = cli
        .output
        .or(file_cfg.output_dir)
        .unwrap_or_else(|| PathBuf::from("clippings"));

    // 4. Resolve tags (CLI > Config)
    let tags = cli.tags.or(file_cfg.tags);

    let config = ExportConfig {
        input_file,
        output_dir,
        tags,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // 5. Parse and group the clippings file
    let books = process::load_books(&config)?;
    if books.is_empty() {
        if !config.quiet {
            eprintln!("No clippings found in {}", config.input_file.display());
        }
        return Ok(());
    }

    // 6. Book selection (interactive unless --all)
    let selection = if cli.all {
        None
    } else {
        let mut titles: Vec<String> = books.iter().map(|b| b.title.clone()).collect();
        titles.sort();
        titles.dedup();
        prompt_book_selection(&titles)?
    };

    // 7. Run the merge
    process::export_books(&config, &books, selection.as_ref())?;
    Ok(())
}
