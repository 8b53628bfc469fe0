// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Convert Telegram chat exports to Markdown.
//!
//! This crate provides loading, rendering, and writing functionality for
//! transforming Telegram Desktop's JSON chat export into a readable Markdown
//! archive.
//!
//! # Overview
//!
//! Telegram Desktop exports a chat as a single `result.json` file. This
//! crate:
//!
//! 1. Parses the JSON structure into typed Rust representations, tolerating
//!    schema drift between client versions
//! 2. Renders the chat as a header block plus one Markdown block per message
//! 3. Writes the document atomically next to the input (or anywhere else)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tg2md::{parser, renderer, writer};
//!
//! let input = Path::new("result.json");
//! let json = std::fs::read_to_string(input).unwrap();
//! let chat = parser::parse_chat(&json).unwrap();
//!
//! let opts = renderer::RenderOptions {
//!     reply_excerpt_len: 80,
//!     ..Default::default()
//! };
//!
//! let blocks = renderer::render_blocks(&chat, &opts);
//! writer::write_document(&writer::default_output_path(input), &blocks).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing and type definitions for Telegram chat exports
//! - [`renderer`]: Markdown generation with configurable output options
//! - [`writer`]: Output path defaulting and atomic file writes

#![deny(missing_docs)]

pub mod parser;
pub mod renderer;
pub mod writer;
