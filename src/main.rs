use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use sieve::config::SieveConfig;
use sieve::docset::{DocIdSet, collect};
use sieve::filter::TermsFilter;
use sieve::index::{Document, IndexReader, MemoryIndex, Term};
use sieve::phrase::{FilterIntersection, PhraseFilter};
use sieve::utils::{split_lines, words};
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sieve")]
#[command(about = "Phrase matching and doc-set filtering over an in-memory line index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Documents per committed segment (overrides the config)
    #[arg(long, global = true)]
    segment_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lines containing a phrase
    Phrase {
        /// Files or directories to index, one document per non-empty line
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Phrase words, in order
        #[arg(short, long, num_args = 1.., required = true)]
        terms: Vec<String>,

        /// Only lines that also contain one of these words
        #[arg(short, long, num_args = 1..)]
        filter: Vec<String>,

        /// Emit JSON instead of colored text
        #[arg(long)]
        json: bool,
    },
    /// Show segment, document and term counts
    Stats {
        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Where a document came from
struct LineSource {
    path: PathBuf,
    line_number: u32,
    text: String,
}

#[derive(Serialize)]
struct LineMatch<'a> {
    doc: u32,
    path: &'a Path,
    line_number: u32,
    text: &'a str,
}

#[derive(Serialize)]
struct PhraseOutput<'a> {
    phrase: &'a [String],
    dense: bool,
    matches: Vec<LineMatch<'a>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SIEVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SieveConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SieveConfig::default(),
    };
    if let Some(segment_size) = cli.segment_size {
        config.segment_size = segment_size;
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Phrase {
            paths,
            terms,
            filter,
            json,
        } => run_phrase(&config, &paths, &terms, &filter, json),
        Commands::Stats { paths } => run_stats(&config, &paths),
    }
}

/// Expand directories into their files, honoring ignore rules
fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.exists() {
            bail!("No such file or directory: {}", path.display());
        }
        for entry in WalkBuilder::new(path).hidden(true).git_ignore(true).build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping entry: {e}");
                    continue;
                }
            };
            if entry.file_type().is_some_and(|t| t.is_file()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Index every non-empty line as one document, committing a segment every
/// `segment_size` documents
fn build_index(config: &SieveConfig, paths: &[PathBuf]) -> Result<(MemoryIndex, Vec<LineSource>)> {
    let files = collect_files(paths)?;

    let contents: Vec<(PathBuf, Vec<u8>)> = files
        .into_par_iter()
        .filter_map(|path| match fs::read(&path) {
            Ok(content) => Some((path, content)),
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                None
            }
        })
        .collect();

    let index = MemoryIndex::new();
    let mut sources = Vec::new();
    for (path, content) in contents {
        for (line_number, text) in split_lines(&content) {
            let doc = index.add_document(Document::new().text(&config.field, &text));
            debug_assert_eq!(doc as usize, sources.len());
            sources.push(LineSource {
                path: path.clone(),
                line_number,
                text,
            });
            if sources.len() % config.segment_size == 0 {
                index.commit();
            }
        }
    }
    index.commit();

    info!(
        "indexed {} lines into {} segments",
        sources.len(),
        index.segments().len()
    );
    Ok((index, sources))
}

fn run_phrase(
    config: &SieveConfig,
    paths: &[PathBuf],
    terms: &[String],
    filter: &[String],
    json: bool,
) -> Result<()> {
    let phrase: Vec<String> = terms.iter().flat_map(|t| words(t)).collect();
    if phrase.is_empty() {
        bail!("Phrase has no indexable words");
    }

    let (index, sources) = build_index(config, paths)?;
    let reader: Arc<dyn IndexReader> = index.reader();

    let mut matcher = PhraseFilter::new(&config.field, &phrase).with_config(config.phrase.clone());
    let filter_terms: Vec<Term> = filter
        .iter()
        .flat_map(|f| words(f))
        .map(|w| Term::new(&config.field, w))
        .collect();
    if !filter_terms.is_empty() {
        let terms_filter = Arc::new(TermsFilter::new(filter_terms));
        matcher = matcher.with_intersection(Arc::new(FilterIntersection::new(terms_filter)));
    }

    let matches = matcher
        .matches(&reader)
        .with_context(|| format!("Phrase match failed for \"{}\"", phrase.join(" ")))?;
    let docs = collect(matches.as_ref());

    if json {
        let output = PhraseOutput {
            phrase: &phrase,
            dense: matches.bits().is_some(),
            matches: docs
                .iter()
                .map(|&doc| {
                    let source = &sources[doc as usize];
                    LineMatch {
                        doc,
                        path: &source.path,
                        line_number: source.line_number,
                        text: &source.text,
                    }
                })
                .collect(),
        };
        serde_json::to_writer_pretty(io::stdout().lock(), &output)?;
        println!();
    } else {
        print_matches(&docs, &sources)?;
    }

    Ok(())
}

/// ripgrep-like `path:line:text` output
fn print_matches(docs: &[u32], sources: &[LineSource]) -> io::Result<()> {
    let choice = if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    for &doc in docs {
        let source = &sources[doc as usize];
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(stdout, "{}", source.path.display())?;
        stdout.reset()?;
        write!(stdout, ":")?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{}", source.line_number)?;
        stdout.reset()?;
        writeln!(stdout, ":{}", source.text)?;
    }
    Ok(())
}

fn run_stats(config: &SieveConfig, paths: &[PathBuf]) -> Result<()> {
    let (index, _) = build_index(config, paths)?;
    let reader: Arc<dyn IndexReader> = index.reader();
    let segments = index.segments();

    println!("sieve index statistics");
    println!("======================");
    println!("Generation:  {}", index.generation());
    println!("Segments:    {}", segments.len());
    println!("Documents:   {}", reader.num_docs());
    println!("Terms:       {}", reader.terms(&config.field)?.len());

    for (i, segment) in segments.iter().enumerate() {
        println!(
            "  segment {i}: {} docs, {} terms",
            segment.max_doc(),
            segment.terms(&config.field)?.len()
        );
    }

    Ok(())
}
