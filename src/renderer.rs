// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Markdown rendering for parsed Telegram chat exports.
//!
//! This module transforms a [`ChatExport`] into a sequence of Markdown
//! blocks: one header block followed by exactly one block per message, in
//! export order. Rendering is pure and never fails; anomalies in the data
//! (broken reply references, unknown media or actions, missing senders)
//! render as placeholders.
//!
//! # Output Format
//!
//! The rendered Markdown includes:
//! - A top-level heading with the chat name
//! - A `Chat Details` property table and a bulleted participant list
//! - A `### Sender` section per message with its timestamp and sequence
//!   number, reply and forward annotations, the formatted text, and media
//!   placeholders
//! - Service events as blockquoted sentences
//! - A `---` divider after every block
//!
//! # Example
//!
//! ```
//! use tg2md::parser::{ChatExport, ChatKind, Message, MessageKind, Span, Timestamp};
//! use tg2md::renderer::{render_chat, RenderOptions};
//!
//! let chat = ChatExport::new(
//!     "Test",
//!     ChatKind::Personal,
//!     Some(1),
//!     vec![Message {
//!         id: Some(1),
//!         sender: Some("Alice".into()),
//!         date: Timestamp::Missing,
//!         reply_to: None,
//!         forwarded_from: None,
//!         kind: MessageKind::Text {
//!             body: vec![Span::plain("Hello!")],
//!             media: None,
//!         },
//!     }],
//! );
//!
//! let markdown = render_chat(&chat, &RenderOptions::default());
//!
//! assert!(markdown.starts_with("# Test"));
//! assert!(markdown.contains("Message #1"));
//! assert!(markdown.contains("Hello!"));
//! ```

use crate::parser::{
    ChatExport, Media, MediaKind, Message, MessageKind, ServiceAction, Span, SpanKind,
};
use std::fmt::Write;
use std::str::FromStr;

/// Text placed between rendered blocks when they are joined.
pub const BLOCK_SEPARATOR: &str = "\n";

/// Visual divider closing every block.
const DIVIDER: &str = "---";

/// Sender shown for text messages without a `from` field.
const UNKNOWN_SENDER: &str = "Unknown";

/// Actor shown for service messages without an `actor` field.
const UNKNOWN_ACTOR: &str = "Someone";

/// How the participant list in the header is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticipantOrder {
    /// Alphabetical by display name.
    #[default]
    Sorted,
    /// In the order senders first appear in the export.
    FirstSeen,
}

impl FromStr for ParticipantOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sorted" => Ok(Self::Sorted),
            "first-seen" => Ok(Self::FirstSeen),
            other => Err(format!(
                "invalid participant order '{other}' (expected 'sorted' or 'first-seen')"
            )),
        }
    }
}

/// Configuration options for Markdown rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Number of heading levels to shift (0-5).
    ///
    /// A value of 0 produces an H1 chat title (default).
    /// A value of 1 produces an H2 chat title, useful for embedding.
    pub heading_offset: u8,

    /// Maximum number of characters quoted from a replied-to message.
    pub reply_excerpt_len: usize,

    /// Ordering of the participant list.
    pub participant_order: ParticipantOrder,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            heading_offset: 0,
            reply_excerpt_len: 100,
            participant_order: ParticipantOrder::Sorted,
        }
    }
}

/// Returns a markdown heading prefix with the given level and offset.
///
/// The heading level is clamped to a maximum of 6 (H6).
fn heading(level: u8, offset: u8) -> String {
    let actual = level.saturating_add(offset).min(6);
    "#".repeat(actual as usize)
}

/// Renders a parsed chat export as Markdown.
///
/// Equivalent to joining [`render_blocks`] with [`BLOCK_SEPARATOR`].
#[must_use]
pub fn render_chat(chat: &ChatExport, opts: &RenderOptions) -> String {
    render_blocks(chat, opts).join(BLOCK_SEPARATOR)
}

/// Renders a chat export as an ordered list of Markdown blocks.
///
/// The first block is the chat header; it is followed by exactly one block
/// per message, in export order.
#[must_use]
pub fn render_blocks(chat: &ChatExport, opts: &RenderOptions) -> Vec<String> {
    let mut blocks = Vec::with_capacity(chat.messages.len() + 1);
    blocks.push(render_header(chat, opts));

    for (pos, msg) in chat.messages.iter().enumerate() {
        blocks.push(render_message(chat, msg, pos + 1, opts));
    }

    blocks
}

fn render_header(chat: &ChatExport, opts: &RenderOptions) -> String {
    let mut out = String::new();
    let offset = opts.heading_offset;

    let mut participants = chat.participants();
    if opts.participant_order == ParticipantOrder::Sorted {
        participants.sort_unstable();
    }

    let id = chat.id.map_or_else(|| "unknown".to_owned(), |id| id.to_string());

    writeln!(out, "{} {}\n", heading(1, offset), escape_xml_tags(&chat.name)).unwrap();
    writeln!(out, "{} Chat Details\n", heading(2, offset)).unwrap();
    out.push_str("| Property | Value |\n");
    out.push_str("|----------|-------|\n");
    writeln!(out, "| **Name** | {} |", escape_table_cell(&chat.name)).unwrap();
    writeln!(out, "| **Type** | {} |", escape_table_cell(&chat.kind.label())).unwrap();
    writeln!(out, "| **ID** | {id} |").unwrap();
    writeln!(out, "| **Total Messages** | {} |", chat.messages.len()).unwrap();

    if let Some((first, last)) = chat.date_range() {
        writeln!(out, "| **First Message** | {} |", first.format("%Y-%m-%d %H:%M:%S")).unwrap();
        writeln!(out, "| **Last Message** | {} |", last.format("%Y-%m-%d %H:%M:%S")).unwrap();
    }

    if !participants.is_empty() {
        writeln!(out, "| **Participants** | {} |", participants.len()).unwrap();
    }
    out.push('\n');

    if !participants.is_empty() {
        writeln!(out, "{} Participants\n", heading(3, offset)).unwrap();
        for name in &participants {
            writeln!(out, "- {}", escape_xml_tags(name)).unwrap();
        }
        out.push('\n');
    }

    writeln!(out, "{DIVIDER}\n").unwrap();
    writeln!(out, "{} Messages", heading(2, offset)).unwrap();

    out
}

fn render_message(chat: &ChatExport, msg: &Message, seq: usize, opts: &RenderOptions) -> String {
    let mut out = String::new();

    match &msg.kind {
        MessageKind::Service { action } => {
            writeln!(out, "> *{}*", service_sentence(msg, action)).unwrap();
            writeln!(out, "> *{}* | Message #{seq}", msg.date).unwrap();
        }
        MessageKind::Text { body, media } => {
            let sender = msg.sender.as_deref().unwrap_or(UNKNOWN_SENDER);
            writeln!(out, "{} {}", heading(3, opts.heading_offset), escape_xml_tags(sender)).unwrap();
            writeln!(out, "*{}* | Message #{seq}\n", msg.date).unwrap();

            if let Some(target_id) = msg.reply_to {
                render_reply(&mut out, chat, target_id, opts);
            }

            if let Some(origin) = &msg.forwarded_from {
                writeln!(out, "> **↪ Forwarded from {}**\n", escape_xml_tags(origin)).unwrap();
            }

            render_text_body(&mut out, body, media.as_ref());
        }
    }

    writeln!(out, "\n{DIVIDER}").unwrap();
    out
}

fn render_reply(out: &mut String, chat: &ChatExport, target_id: i64, opts: &RenderOptions) {
    let Some(target) = chat.find_message(target_id) else {
        out.push_str("> **↩ Reply to unavailable message**\n\n");
        return;
    };

    let sender = target.sender.as_deref().unwrap_or(UNKNOWN_SENDER);
    let excerpt = reply_excerpt(target, opts.reply_excerpt_len);
    writeln!(
        out,
        "> **↩ Reply to {}:** {excerpt}\n",
        escape_xml_tags(sender)
    )
    .unwrap();
}

/// The text a reply quotes, cut to `limit` characters: the body, else the
/// caption, else the media label. Service targets quote their sentence.
fn reply_excerpt(target: &Message, limit: usize) -> String {
    match &target.kind {
        MessageKind::Service { action } => {
            truncate_rendered(&service_sentence(target, action), limit)
        }
        MessageKind::Text { body, .. } if !body.is_empty() => truncate_spans(body, limit),
        MessageKind::Text {
            media: Some(Media {
                caption: Some(caption),
                ..
            }),
            ..
        } => truncate_spans(caption, limit),
        MessageKind::Text { media: Some(m), .. } => {
            truncate_rendered(&media_label(&m.kind), limit)
        }
        MessageKind::Text { .. } => "[Empty message]".to_owned(),
    }
}

/// Cuts span text to `limit` characters before any markup is applied, so
/// the cut never splits an escape sequence or leaves emphasis open.
fn truncate_spans(spans: &[Span], limit: usize) -> String {
    let mut budget = limit;
    let mut kept = Vec::with_capacity(spans.len());
    let mut truncated = false;

    for span in spans {
        let text = span.text.replace('\n', " ");
        let len = text.chars().count();
        if len <= budget {
            budget -= len;
            kept.push(Span {
                kind: span.kind.clone(),
                text,
            });
            continue;
        }

        let cut: String = text.chars().take(budget).collect();
        if !cut.is_empty() {
            kept.push(Span {
                kind: span.kind.clone(),
                text: cut,
            });
        }
        truncated = true;
        break;
    }

    let rendered = render_spans(&kept).replace('\n', " ");
    let rendered = rendered.trim();
    if truncated {
        format!("{rendered}...")
    } else {
        rendered.to_owned()
    }
}

/// Cuts already-escaped text to `limit` characters, stepping back before an
/// HTML entity the cut would split.
fn truncate_rendered(text: &str, limit: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= limit {
        return flat.to_owned();
    }

    let mut cut: String = flat.chars().take(limit).collect();
    if let Some(amp) = cut.rfind('&')
        && !cut[amp..].contains(';')
    {
        cut.truncate(amp);
    }
    format!("{cut}...")
}

fn render_text_body(out: &mut String, body: &[Span], media: Option<&Media>) {
    if let Some(media) = media {
        writeln!(out, "📎 {}", media_label(&media.kind)).unwrap();
        if let Some(caption) = &media.caption {
            writeln!(out, "\n{}", render_spans(caption)).unwrap();
        }
    }

    if !body.is_empty() {
        if media.is_some() {
            out.push('\n');
        }
        writeln!(out, "{}", render_spans(body)).unwrap();
    }

    if body.is_empty() && media.is_none() {
        out.push_str("*[Empty message]*\n");
    }
}

/// Renders rich-text spans in order, without re-flowing.
fn render_spans(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        render_span(&mut out, span);
    }
    out
}

fn render_span(out: &mut String, span: &Span) {
    let text = &span.text;
    match &span.kind {
        SpanKind::Bold => write!(out, "**{}**", escape_xml_tags(text)).unwrap(),
        SpanKind::Italic => write!(out, "*{}*", escape_xml_tags(text)).unwrap(),
        SpanKind::Code => write!(out, "`{}`", escape_for_inline_code(text)).unwrap(),
        SpanKind::Pre { language } => {
            let lang = language.as_deref().unwrap_or("");
            write!(out, "\n```{lang}\n{text}\n```\n").unwrap();
        }
        SpanKind::TextLink { href } => write!(
            out,
            "[{}]({})",
            escape_xml_tags(text),
            escape_link_target(href)
        )
        .unwrap(),
        SpanKind::Mention | SpanKind::MentionName => {
            if text.starts_with('@') {
                out.push_str(&escape_xml_tags(text));
            } else {
                write!(out, "@{}", escape_xml_tags(text)).unwrap();
            }
        }
        SpanKind::Strikethrough => write!(out, "~~{}~~", escape_xml_tags(text)).unwrap(),
        SpanKind::Underline => write!(out, "<u>{}</u>", escape_xml_tags(text)).unwrap(),
        SpanKind::Spoiler => write!(out, "||{}||", escape_xml_tags(text)).unwrap(),
        SpanKind::Plain
        | SpanKind::Link
        | SpanKind::Hashtag
        | SpanKind::Email
        | SpanKind::Phone
        | SpanKind::CustomEmoji
        | SpanKind::Other { .. } => out.push_str(&escape_xml_tags(text)),
    }
}

/// Bracketed placeholder for an attachment.
fn media_label(kind: &MediaKind) -> String {
    let esc = escape_xml_tags;
    match kind {
        MediaKind::Photo => "[Photo]".into(),
        MediaKind::Sticker { emoji: Some(emoji) } => format!("[Sticker {}]", esc(emoji)),
        MediaKind::Sticker { emoji: None } => "[Sticker]".into(),
        MediaKind::VoiceMessage { duration } => format!("[Voice message - {duration}s]"),
        MediaKind::VideoMessage { duration } => format!("[Video message - {duration}s]"),
        MediaKind::Animation => "[GIF]".into(),
        MediaKind::Video => "[Video]".into(),
        MediaKind::Audio {
            title,
            performer: Some(performer),
        } => format!("[Audio: {} - {}]", esc(performer), esc(title)),
        MediaKind::Audio { title, performer: None } => format!("[Audio: {}]", esc(title)),
        MediaKind::File { name } => format!("[File: {}]", esc(name)),
        MediaKind::Location { latitude, longitude } => {
            format!("[Location: {}, {}]", esc(latitude), esc(longitude))
        }
        MediaKind::Contact { name, phone } => format!("[Contact: {} - {}]", esc(name), esc(phone)),
        MediaKind::Poll { question } => format!("[Poll: {}]", esc(question)),
        MediaKind::Unknown { .. } => "[Media attachment]".into(),
    }
}

/// One descriptive sentence for a service event.
fn service_sentence(msg: &Message, action: &ServiceAction) -> String {
    let actor = escape_xml_tags(msg.sender.as_deref().unwrap_or(UNKNOWN_ACTOR));

    match action {
        ServiceAction::CreateGroup { title } if !title.is_empty() => {
            format!("{actor} created the group \"{}\"", escape_xml_tags(title))
        }
        ServiceAction::CreateGroup { .. } => format!("{actor} created the group"),
        ServiceAction::InviteMembers { members } if !members.is_empty() => {
            format!("{actor} invited {} to the group", escape_xml_tags(&members.join(", ")))
        }
        ServiceAction::InviteMembers { .. } => format!("{actor} invited members to the group"),
        ServiceAction::RemoveMembers { members } if !members.is_empty() => {
            format!("{actor} removed {} from the group", escape_xml_tags(&members.join(", ")))
        }
        ServiceAction::RemoveMembers { .. } => format!("{actor} removed members from the group"),
        ServiceAction::JoinGroupByLink => format!("{actor} joined the group via invite link"),
        ServiceAction::LeaveGroup => format!("{actor} left the group"),
        ServiceAction::PinMessage => format!("{actor} pinned a message"),
        ServiceAction::EditGroupTitle { title } => {
            format!("{actor} changed the group title to \"{}\"", escape_xml_tags(title))
        }
        ServiceAction::EditGroupPhoto => format!("{actor} changed the group photo"),
        ServiceAction::DeleteGroupPhoto => format!("{actor} deleted the group photo"),
        ServiceAction::MigrateFromGroup | ServiceAction::MigrateToSupergroup => {
            "Group upgraded to supergroup".into()
        }
        ServiceAction::PhoneCall { duration: Some(secs) } => format!("Phone call with {actor} ({secs}s)"),
        ServiceAction::PhoneCall { duration: None } => format!("Phone call with {actor}"),
        ServiceAction::ScoreInGame { score: Some(score) } => format!("{actor} scored {score} in a game"),
        ServiceAction::ScoreInGame { score: None } => format!("{actor} scored in a game"),
        ServiceAction::BotAllowed => format!("Bot allowed by {actor}"),
        ServiceAction::Unknown { action } if action.is_empty() => {
            format!("{actor} triggered a group event")
        }
        ServiceAction::Unknown { action } => {
            format!("{actor} triggered a group event ({})", escape_xml_tags(action))
        }
    }
}

/// Escapes backticks in a string for use inside inline code spans.
///
/// Replaces backticks with single quotes to avoid breaking the inline code
/// syntax.
fn escape_for_inline_code(s: &str) -> String {
    s.replace('`', "'")
}

/// Percent-encodes characters that would end or split a Markdown link
/// destination.
fn escape_link_target(href: &str) -> String {
    let mut out = String::with_capacity(href.len());
    for c in href.chars() {
        match c {
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            ' ' => out.push_str("%20"),
            c if c.is_whitespace() => {
                let mut buf = [0; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    write!(out, "%{byte:02X}").unwrap();
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Makes a value safe for a single Markdown table cell.
fn escape_table_cell(s: &str) -> String {
    escape_xml_tags(s).replace('|', "\\|").replace('\n', " ")
}

/// Escapes XML/HTML-like tags so they render literally in Markdown.
///
/// Uses HTML entities (`&lt;` `&gt;`) which are more reliably rendered across
/// markdown viewers. Only escapes `<` when followed by a letter, `/`, or `!`
/// to avoid false positives on comparisons like `x < 5`.
fn escape_xml_tags(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    let mut chars = s.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        if c == '<' {
            let is_tag_start = chars
                .peek()
                .is_some_and(|&next| next.is_ascii_alphabetic() || next == '/' || next == '!');

            if is_tag_start {
                result.push_str("&lt;");
                in_tag = true;
            } else {
                result.push(c);
            }
        } else if c == '>' && in_tag {
            result.push_str("&gt;");
            in_tag = false;
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ChatKind, Timestamp};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> Timestamp {
        Timestamp::Parsed(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .and_then(|d| d.and_hms_opt(hour, 0, 0))
                .unwrap(),
        )
    }

    fn text(id: i64, sender: &str, spans: Vec<Span>) -> Message {
        Message {
            id: Some(id),
            sender: Some(sender.into()),
            date: at(15, 10),
            reply_to: None,
            forwarded_from: None,
            kind: MessageKind::Text {
                body: spans,
                media: None,
            },
        }
    }

    fn plain(id: i64, sender: &str, body: &str) -> Message {
        text(id, sender, vec![Span::plain(body)])
    }

    fn with_media(id: i64, kind: MediaKind, caption: Option<&str>) -> Message {
        Message {
            kind: MessageKind::Text {
                body: vec![],
                media: Some(Media {
                    kind,
                    caption: caption.map(|c| vec![Span::plain(c)]),
                }),
            },
            ..plain(id, "Alice", "")
        }
    }

    fn service(id: i64, actor: Option<&str>, action: ServiceAction) -> Message {
        Message {
            id: Some(id),
            sender: actor.map(str::to_owned),
            date: at(15, 10),
            reply_to: None,
            forwarded_from: None,
            kind: MessageKind::Service { action },
        }
    }

    fn span(kind: SpanKind, text: &str) -> Span {
        Span {
            kind,
            text: text.into(),
        }
    }

    fn make_chat(messages: Vec<Message>) -> ChatExport {
        ChatExport::new("Test", ChatKind::PrivateGroup, Some(99), messages)
    }

    fn render(messages: Vec<Message>) -> String {
        render_chat(&make_chat(messages), &RenderOptions::default())
    }

    #[test]
    fn renders_header_table() {
        let output = render(vec![plain(1, "Alice", "Hi")]);

        assert!(output.starts_with("# Test\n\n## Chat Details\n"));
        assert!(output.contains("| **Name** | Test |"));
        assert!(output.contains("| **Type** | Private Group |"));
        assert!(output.contains("| **ID** | 99 |"));
        assert!(output.contains("| **Total Messages** | 1 |"));
        assert!(output.contains("| **Participants** | 1 |"));
        assert!(output.contains("### Participants\n\n- Alice\n"));
        assert!(output.contains("---\n\n## Messages\n"));
    }

    #[test]
    fn header_date_range_uses_min_and_max() {
        let mut early = plain(1, "Alice", "later in list");
        early.date = at(3, 8);
        let mut late = plain(2, "Bob", "earlier in list");
        late.date = at(20, 18);
        let mut middle = plain(3, "Carol", "x");
        middle.date = at(10, 12);

        let output = render(vec![middle, late, early]);

        assert!(output.contains("| **First Message** | 2024-01-03 08:00:00 |"));
        assert!(output.contains("| **Last Message** | 2024-01-20 18:00:00 |"));
    }

    #[test]
    fn omits_date_rows_without_parsed_dates() {
        let mut msg = plain(1, "Alice", "x");
        msg.date = Timestamp::Raw("sometime".into());
        let output = render(vec![msg]);

        assert!(!output.contains("First Message"));
        assert!(output.contains("*sometime* | Message #1"));
    }

    #[test]
    fn participants_sorted_by_default() {
        let output = render(vec![
            plain(1, "Zed", "a"),
            plain(2, "Alice", "b"),
            plain(3, "Zed", "c"),
        ]);

        assert!(output.contains("- Alice\n- Zed\n"));
        assert_eq!(output.matches("- Zed").count(), 1);
    }

    #[test]
    fn participants_in_first_seen_order_when_requested() {
        let chat = make_chat(vec![plain(1, "Zed", "a"), plain(2, "Alice", "b")]);
        let opts = RenderOptions {
            participant_order: ParticipantOrder::FirstSeen,
            ..Default::default()
        };
        let output = render_chat(&chat, &opts);

        assert!(output.contains("- Zed\n- Alice\n"));
    }

    #[test]
    fn one_block_per_message_plus_header() {
        let chat = make_chat(vec![
            plain(1, "Alice", "one"),
            service(2, Some("Bob"), ServiceAction::PinMessage),
            plain(3, "Bob", "three"),
        ]);
        let blocks = render_blocks(&chat, &RenderOptions::default());

        assert_eq!(blocks.len(), 4);
        assert!(blocks[1].contains("Message #1") && blocks[1].contains("one"));
        assert!(blocks[2].contains("Message #2") && blocks[2].contains("pinned a message"));
        assert!(blocks[3].contains("Message #3") && blocks[3].contains("three"));
        assert!(blocks[1..].iter().all(|b| b.ends_with("---\n")));
    }

    #[test]
    fn sequence_number_is_position_not_id() {
        let output = render(vec![plain(500, "Alice", "a"), plain(17, "Bob", "b")]);

        assert!(output.contains("### Alice\n*2024-01-15 10:00:00* | Message #1\n"));
        assert!(output.contains("### Bob\n*2024-01-15 10:00:00* | Message #2\n"));
    }

    #[test]
    fn renders_reply_excerpt_with_target_sender() {
        let mut reply = plain(2, "Bob", "Hello");
        reply.reply_to = Some(1);
        let output = render(vec![plain(1, "Alice", "Hi"), reply]);

        assert!(output.contains("> **↩ Reply to Alice:** Hi\n"));
    }

    #[test]
    fn reply_to_missing_message_renders_placeholder() {
        let mut reply = plain(2, "Bob", "Hello");
        reply.reply_to = Some(12345);
        let output = render(vec![reply]);

        assert!(output.contains("> **↩ Reply to unavailable message**"));
        assert!(output.contains("Hello"));
    }

    #[test]
    fn reply_excerpt_is_truncated_and_flattened() {
        let long = format!("line one\n{}", "é".repeat(200));
        let mut reply = plain(2, "Bob", "ok");
        reply.reply_to = Some(1);
        let chat = make_chat(vec![plain(1, "Alice", &long), reply]);
        let opts = RenderOptions {
            reply_excerpt_len: 20,
            ..Default::default()
        };
        let output = render_chat(&chat, &opts);

        let expected = format!("> **↩ Reply to Alice:** line one {}...\n", "é".repeat(11));
        assert!(output.contains(&expected));
    }

    #[test]
    fn reply_excerpt_cut_keeps_markup_balanced() {
        let mut reply = plain(2, "Bob", "ok");
        reply.reply_to = Some(1);
        let chat = make_chat(vec![
            text(1, "Alice", vec![span(SpanKind::Bold, "aaaaaaa<b>")]),
            reply,
        ]);
        let opts = RenderOptions {
            reply_excerpt_len: 9,
            ..Default::default()
        };
        let output = render_chat(&chat, &opts);

        assert!(output.contains("> **↩ Reply to Alice:** **aaaaaaa&lt;b**...\n"));
    }

    #[test]
    fn reply_excerpt_cut_spans_several_spans() {
        let mut reply = plain(2, "Bob", "ok");
        reply.reply_to = Some(1);
        let chat = make_chat(vec![
            text(
                1,
                "Alice",
                vec![span(SpanKind::Plain, "see "), span(SpanKind::Italic, "this one")],
            ),
            reply,
        ]);
        let opts = RenderOptions {
            reply_excerpt_len: 8,
            ..Default::default()
        };
        let output = render_chat(&chat, &opts);

        assert!(output.contains("> **↩ Reply to Alice:** see *this*...\n"));
    }

    #[test]
    fn rendered_excerpt_cut_never_splits_an_entity() {
        assert_eq!(truncate_rendered("File &lt;img&gt;", 7), "File ...");
        assert_eq!(truncate_rendered("File &lt;img&gt;", 9), "File &lt;...");
        assert_eq!(truncate_rendered("short", 9), "short");
    }

    #[test]
    fn reply_to_media_quotes_caption_or_label() {
        let mut to_photo = plain(3, "Bob", "nice");
        to_photo.reply_to = Some(1);
        let mut to_voice = plain(4, "Bob", "listening");
        to_voice.reply_to = Some(2);

        let output = render(vec![
            with_media(1, MediaKind::Photo, Some("sunset")),
            with_media(2, MediaKind::VoiceMessage { duration: 3 }, None),
            to_photo,
            to_voice,
        ]);

        assert!(output.contains("> **↩ Reply to Alice:** sunset\n"));
        assert!(output.contains("> **↩ Reply to Alice:** [Voice message - 3s]\n"));
    }

    #[test]
    fn reply_to_service_message_quotes_sentence() {
        let mut reply = plain(2, "Bob", "welcome");
        reply.reply_to = Some(1);
        let output = render(vec![
            service(1, Some("Carol"), ServiceAction::JoinGroupByLink),
            reply,
        ]);

        assert!(output.contains("> **↩ Reply to Carol:** Carol joined the group via invite link\n"));
    }

    #[test]
    fn renders_forward_annotation() {
        let mut msg = plain(1, "Alice", "news");
        msg.forwarded_from = Some("Daily Channel".into());
        let output = render(vec![msg]);

        assert!(output.contains("> **↪ Forwarded from Daily Channel**\n"));
    }

    #[test]
    fn renders_span_markup() {
        let output = render(vec![text(
            1,
            "Alice",
            vec![
                span(SpanKind::Plain, "a "),
                span(SpanKind::Bold, "b"),
                span(SpanKind::Italic, "i"),
                span(SpanKind::Code, "c"),
                span(
                    SpanKind::TextLink {
                        href: "https://x.y".into(),
                    },
                    "link",
                ),
                span(SpanKind::Mention, "@bob"),
                span(SpanKind::MentionName, "Carol"),
                span(SpanKind::Strikethrough, "s"),
                span(SpanKind::Underline, "u"),
                span(SpanKind::Spoiler, "sp"),
            ],
        )]);

        assert!(output.contains("a **b***i*`c`[link](https://x.y)@bob@Carol~~s~~<u>u</u>||sp||"));
    }

    #[test]
    fn link_targets_with_parentheses_and_spaces_stay_intact() {
        let output = render(vec![text(
            1,
            "Alice",
            vec![span(
                SpanKind::TextLink {
                    href: "https://en.wikipedia.org/wiki/Rust_(language) x".into(),
                },
                "wiki",
            )],
        )]);

        assert!(output.contains("[wiki](https://en.wikipedia.org/wiki/Rust_%28language%29%20x)"));
    }

    #[test]
    fn renders_pre_block_with_language() {
        let output = render(vec![text(
            1,
            "Alice",
            vec![span(
                SpanKind::Pre {
                    language: Some("rust".into()),
                },
                "fn main() {}",
            )],
        )]);

        assert!(output.contains("```rust\nfn main() {}\n```"));
    }

    #[test]
    fn unknown_span_renders_verbatim() {
        let output = render(vec![text(
            1,
            "Alice",
            vec![span(SpanKind::Other { kind: "sparkle".into() }, "shiny")],
        )]);

        assert!(output.contains("\nshiny\n"));
    }

    #[test]
    fn renders_known_media_placeholder_and_caption() {
        let output = render(vec![with_media(1, MediaKind::Photo, Some("sunset"))]);

        assert!(output.contains("📎 [Photo]\n\nsunset\n"));
        assert!(!output.contains("Empty message"));
    }

    #[test]
    fn unknown_media_renders_generic_placeholder() {
        let output = render(vec![with_media(
            1,
            MediaKind::Unknown {
                kind: "hologram".into(),
            },
            None,
        )]);

        assert!(output.contains("📎 [Media attachment]"));
        assert!(!output.contains("hologram"));
    }

    #[test]
    fn media_labels() {
        assert_eq!(media_label(&MediaKind::Sticker { emoji: Some("😀".into()) }), "[Sticker 😀]");
        assert_eq!(media_label(&MediaKind::Sticker { emoji: None }), "[Sticker]");
        assert_eq!(media_label(&MediaKind::Animation), "[GIF]");
        assert_eq!(
            media_label(&MediaKind::Audio {
                title: "Song".into(),
                performer: Some("Band".into())
            }),
            "[Audio: Band - Song]"
        );
        assert_eq!(media_label(&MediaKind::File { name: "a.pdf".into() }), "[File: a.pdf]");
        assert_eq!(
            media_label(&MediaKind::File {
                name: "<img src=x>".into()
            }),
            "[File: &lt;img src=x&gt;]"
        );
        assert_eq!(
            media_label(&MediaKind::Contact {
                name: "<b>Carol</b>".into(),
                phone: "+1".into()
            }),
            "[Contact: &lt;b&gt;Carol&lt;/b&gt; - +1]"
        );
        assert_eq!(
            media_label(&MediaKind::Location {
                latitude: "1.5".into(),
                longitude: "2".into()
            }),
            "[Location: 1.5, 2]"
        );
        assert_eq!(
            media_label(&MediaKind::Poll {
                question: "Lunch?".into()
            }),
            "[Poll: Lunch?]"
        );
    }

    #[test]
    fn renders_empty_message_placeholder() {
        let output = render(vec![text(1, "Alice", vec![])]);
        assert!(output.contains("*[Empty message]*"));
    }

    #[test]
    fn renders_unknown_sender() {
        let mut msg = plain(1, "x", "anon");
        msg.sender = None;
        let output = render(vec![msg]);

        assert!(output.contains("### Unknown\n"));
        assert!(!output.contains("### Participants"));
    }

    #[test]
    fn renders_service_sentences() {
        let output = render(vec![
            service(1, Some("Alice"), ServiceAction::JoinGroupByLink),
            service(2, Some("Bob"), ServiceAction::EditGroupTitle { title: "Z".into() }),
            service(
                3,
                Some("Bob"),
                ServiceAction::InviteMembers {
                    members: vec!["Carol".into(), "Dan".into()],
                },
            ),
            service(4, None, ServiceAction::LeaveGroup),
        ]);

        assert!(output.contains("> *Alice joined the group via invite link*\n> *2024-01-15 10:00:00* | Message #1\n"));
        assert!(output.contains("> *Bob changed the group title to \"Z\"*"));
        assert!(output.contains("> *Bob invited Carol, Dan to the group*"));
        assert!(output.contains("> *Someone left the group*"));
    }

    #[test]
    fn unknown_action_renders_generic_event() {
        let output = render(vec![service(
            1,
            Some("Bob"),
            ServiceAction::Unknown {
                action: "teleport".into(),
            },
        )]);

        assert!(output.contains("> *Bob triggered a group event (teleport)*"));
    }

    #[test]
    fn heading_offset_shifts_levels() {
        let chat = make_chat(vec![plain(1, "Alice", "Hi")]);
        let opts = RenderOptions {
            heading_offset: 1,
            ..Default::default()
        };
        let output = render_chat(&chat, &opts);

        assert!(output.starts_with("## Test\n"));
        assert!(output.contains("### Chat Details"));
        assert!(output.contains("#### Alice"));
    }

    #[test]
    fn heading_is_clamped() {
        assert_eq!(heading(3, 5), "######");
        assert_eq!(heading(1, u8::MAX), "######");
    }

    #[test]
    fn escapes_pipes_in_table_cells() {
        let chat = ChatExport::new("a | b", ChatKind::Personal, None, vec![]);
        let output = render_chat(&chat, &RenderOptions::default());

        assert!(output.contains("| **Name** | a \\| b |"));
        assert!(output.contains("| **ID** | unknown |"));
    }

    #[test]
    fn escapes_xml_in_message_text() {
        let output = render(vec![plain(1, "Alice", "<script>alert(1)</script>")]);
        assert!(output.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn escapes_backticks_in_code_span() {
        let output = render(vec![text(1, "Alice", vec![span(SpanKind::Code, "a`b")])]);
        assert!(output.contains("`a'b`"));
    }

    #[test]
    fn parses_participant_order() {
        assert_eq!("sorted".parse::<ParticipantOrder>(), Ok(ParticipantOrder::Sorted));
        assert_eq!(
            "first-seen".parse::<ParticipantOrder>(),
            Ok(ParticipantOrder::FirstSeen)
        );
        assert!("random".parse::<ParticipantOrder>().is_err());
    }

    #[test]
    fn escapes_xml_tags() {
        assert_eq!(escape_xml_tags("<div>"), "&lt;div&gt;");
        assert_eq!(escape_xml_tags("</div>"), "&lt;/div&gt;");
        assert_eq!(escape_xml_tags("a < b"), "a < b");
        assert_eq!(escape_xml_tags("value<"), "value<");
    }
}
