// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Writing rendered documents to disk.
//!
//! Output is first written to a temporary file next to the destination and
//! then renamed over it, so a failed conversion never leaves a partially
//! written document behind. Existing files at the destination are replaced
//! without prompting, unless they are read-only.

use crate::renderer::BLOCK_SEPARATOR;
use snafu::prelude::*;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Error returned when the destination cannot be written.
#[derive(Debug, Snafu)]
pub enum OutputWriteError {
    /// The temporary file could not be created, usually because the
    /// destination directory is missing or not writable.
    #[snafu(display("cannot create a file in {}: {source}", dir.display()))]
    CreateTemp {
        /// Directory the temporary file was created in.
        dir: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The destination exists and is read-only.
    #[snafu(display("{} is read-only", path.display()))]
    ReadOnly {
        /// The destination path.
        path: PathBuf,
    },

    /// Writing the document contents failed.
    #[snafu(display("failed to write {}: {source}", path.display()))]
    Write {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The finished document could not be moved into place.
    #[snafu(display("failed to replace {}: {source}", path.display()))]
    Persist {
        /// The destination path.
        path: PathBuf,
        /// The underlying persist error.
        source: tempfile::PersistError,
    },
}

/// Derives the output path from the input path by swapping the extension
/// for `.md`.
///
/// If the input already ends in `.md`, `.md` is appended instead so the
/// input is never overwritten.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use tg2md::writer::default_output_path;
///
/// assert_eq!(default_output_path(Path::new("export/result.json")), Path::new("export/result.md"));
/// assert_eq!(default_output_path(Path::new("notes.md")), Path::new("notes.md.md"));
/// ```
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let candidate = input.with_extension("md");
    if candidate == input {
        let mut name = OsString::from(input.as_os_str());
        name.push(".md");
        PathBuf::from(name)
    } else {
        candidate
    }
}

/// Writes rendered blocks to any writer, separated by [`BLOCK_SEPARATOR`].
///
/// # Errors
///
/// Propagates errors from the underlying writer.
pub fn write_blocks<W: Write>(writer: &mut W, blocks: &[String]) -> io::Result<()> {
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            writer.write_all(BLOCK_SEPARATOR.as_bytes())?;
        }
        writer.write_all(block.as_bytes())?;
    }
    writer.flush()
}

/// Atomically writes rendered blocks to `path`, replacing any existing file.
///
/// The destination directory must already exist.
///
/// # Errors
///
/// Returns an error if the destination is read-only, if its directory is
/// missing or not writable, or if writing or renaming the temporary file
/// fails. The destination is left untouched in every error case.
pub fn write_document(path: &Path, blocks: &[String]) -> Result<(), OutputWriteError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // A rename only needs a writable directory, so protected files are
    // refused here rather than replaced.
    let existing = fs::metadata(path).ok();
    if let Some(meta) = &existing {
        ensure!(!meta.permissions().readonly(), ReadOnlySnafu { path });
    }

    let mut tmp = NamedTempFile::new_in(dir).context(CreateTempSnafu { dir })?;
    debug!(tmp = %tmp.path().display(), dest = %path.display(), "writing document");

    {
        let mut buf = BufWriter::new(tmp.as_file_mut());
        write_blocks(&mut buf, blocks).context(WriteSnafu { path })?;
    }

    // Keep the mode of a file we are replacing instead of the temp file's.
    if let Some(meta) = existing {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .context(WriteSnafu { path })?;
    }

    tmp.persist(path).context(PersistSnafu { path })?;
    Ok(())
}
