// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for tg2md.
//!
//! This binary provides the `tg2md` command for converting a Telegram chat
//! export from JSON to a Markdown document.

use lexopt::prelude::*;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tg2md::{parser, renderer, writer};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Where to write the rendered output.
#[derive(Clone)]
enum OutputTarget {
    /// Write to the given file.
    File(PathBuf),
    /// Write to stdout.
    Stdout,
}

struct Cli {
    input: PathBuf,
    output: Option<OutputTarget>,
    render: renderer::RenderOptions,
    quiet: bool,
    verbose: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to load {}: {source}", path.display()))]
    LoadChat {
        path: PathBuf,
        source: parser::MalformedInputError,
    },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: writer::OutputWriteError,
    },

    #[snafu(display("failed to write to stdout: {source}"))]
    WriteStdout { source: std::io::Error },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert Telegram chat exports to Markdown

Usage: {name} [OPTIONS] <INPUT>

Arguments:
  <INPUT>  Telegram chat export (result.json)

Options:
  -o, --output <OUTPUT>      Output file (default: INPUT with a .md extension, - for stdout)
      --heading-offset <N>   Shift heading levels by N (0-5, default: 0)
      --reply-excerpt <N>    Max characters quoted from replied-to messages (default: 100)
      --participants <ORDER> Participant list order: sorted or first-seen (default: sorted)

Other options:
  -q, --quiet                Suppress progress messages
  -v, --verbose              Print debug diagnostics to stderr
  -h, --help                 Print help
  -V, --version              Print version

Existing output files are overwritten.",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input: Option<PathBuf> = None;
    let mut output: Option<OutputTarget> = None;
    let mut render = renderer::RenderOptions::default();
    let mut quiet = false;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::File(val)
                });
            }
            Long("heading-offset") => {
                let val: u8 = parser
                    .value()?
                    .parse()
                    .map_err(|_| "heading-offset must be a number 0-5")?;
                if val > 5 {
                    return Err("heading-offset must be 0-5".into());
                }
                render.heading_offset = val;
            }
            Long("reply-excerpt") => {
                render.reply_excerpt_len = parser
                    .value()?
                    .parse()
                    .map_err(|_| "reply-excerpt must be a non-negative number")?;
            }
            Long("participants") => render.participant_order = parser.value()?.parse()?,
            Short('q') | Long("quiet") => quiet = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) if input.is_none() => input = Some(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input: input.ok_or("missing required argument: <INPUT>")?,
        output,
        render,
        quiet,
        verbose,
    })
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "tg2md=debug" } else { "tg2md=warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::new(level))
        .try_init();
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    init_tracing(cli.verbose);

    let target = cli
        .output
        .clone()
        .unwrap_or_else(|| OutputTarget::File(writer::default_output_path(&cli.input)));

    convert(&cli, &target)
}

/// Loads, renders, and writes a single export.
///
/// The input is fully loaded before anything is written, so a malformed
/// export never creates or touches the output file.
fn convert(cli: &Cli, target: &OutputTarget) -> Result<(), Error> {
    let input = cli.input.as_path();

    if !cli.quiet {
        eprintln!("Loading chat data from {}", input.display());
    }
    let json = std::fs::read_to_string(input).context(ReadFileSnafu { path: input })?;
    let chat = parser::parse_chat(&json).context(LoadChatSnafu { path: input })?;

    debug!(messages = chat.messages.len(), "rendering");
    let blocks = renderer::render_blocks(&chat, &cli.render);

    match target {
        OutputTarget::Stdout => {
            let stdout = std::io::stdout();
            writer::write_blocks(&mut stdout.lock(), &blocks).context(WriteStdoutSnafu)?;
        }
        OutputTarget::File(path) => {
            writer::write_document(path, &blocks).context(WriteFileSnafu { path })?;
            if !cli.quiet {
                eprintln!(
                    "Wrote {} ({} messages)",
                    path.display(),
                    chat.messages.len()
                );
            }
        }
    }

    Ok(())
}
