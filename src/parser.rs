// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for Telegram chat exports.
//!
//! This module handles the `result.json` file produced by Telegram Desktop's
//! "Export chat history" feature. The export format drifts between client
//! versions, so every field is read on a best-effort basis: missing optional
//! fields fall back to defaults and unknown message, media, span, or action
//! kinds load as generic variants instead of failing.
//!
//! # Format Overview
//!
//! A Telegram chat export contains:
//! - Chat metadata (name, type, numeric id)
//! - An ordered list of messages, each either a regular `"message"` or a
//!   `"service"` event (joins, title changes, pins, ...)
//! - Message text as either a plain string or an array of rich-text spans
//!
//! # Example
//!
//! ```
//! use tg2md::parser::parse_chat;
//!
//! let json = r#"{
//!     "name": "Test",
//!     "type": "personal_chat",
//!     "id": 42,
//!     "messages": [{
//!         "id": 1,
//!         "type": "message",
//!         "date": "2024-01-15T10:30:00",
//!         "from": "Alice",
//!         "text": "Hi"
//!     }]
//! }"#;
//!
//! let chat = parse_chat(json).unwrap();
//! assert_eq!(chat.messages.len(), 1);
//! ```

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use snafu::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Chat name used when the export does not carry one.
const DEFAULT_CHAT_NAME: &str = "Telegram Chat";

/// Error returned when the input cannot be loaded as a chat export at all.
///
/// Only structural failures end up here. Anything below the top level
/// degrades to placeholders instead.
#[derive(Debug, Snafu)]
pub enum MalformedInputError {
    /// The input is not valid JSON.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },

    /// The top-level JSON value is not an object.
    #[snafu(display("expected a JSON object at the top level, found {found}"))]
    NotAnObject {
        /// The JSON type that was found instead.
        found: &'static str,
    },

    /// The `messages` array is absent or not an array.
    #[snafu(display("missing `messages` array"))]
    MissingMessages,
}

/// The root structure of a Telegram chat export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatExport {
    /// The chat title, or the other party's name for personal chats.
    pub name: String,

    /// The kind of chat this export came from.
    pub kind: ChatKind,

    /// Telegram's numeric chat identifier, when present.
    pub id: Option<i64>,

    /// Messages in export order. Never reordered.
    pub messages: Vec<Message>,

    /// Message id to position in `messages`. First occurrence wins.
    index: HashMap<i64, usize>,
}

impl ChatExport {
    /// Builds a chat export and indexes its messages by id.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ChatKind,
        id: Option<i64>,
        messages: Vec<Message>,
    ) -> Self {
        let mut index = HashMap::with_capacity(messages.len());
        for (pos, msg) in messages.iter().enumerate() {
            if let Some(id) = msg.id {
                index.entry(id).or_insert(pos);
            }
        }

        Self {
            name: name.into(),
            kind,
            id,
            messages,
            index,
        }
    }

    /// Looks up a message by its Telegram id.
    #[must_use]
    pub fn find_message(&self, id: i64) -> Option<&Message> {
        self.index.get(&id).map(|&pos| &self.messages[pos])
    }

    /// Returns the distinct sender names in first-seen order.
    #[must_use]
    pub fn participants(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.messages
            .iter()
            .filter_map(|m| m.sender.as_deref())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Returns the earliest and latest parsed message timestamps.
    ///
    /// Messages are not assumed to be sorted. Timestamps that failed to parse
    /// are ignored.
    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut dates = self.messages.iter().filter_map(|m| m.date.parsed());
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

/// The type of a chat, taken from the export's `type` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatKind {
    /// A one-to-one chat with another user.
    Personal,
    /// A chat with a bot.
    Bot,
    /// The user's own "Saved Messages".
    SavedMessages,
    /// A basic (non-super) group.
    PrivateGroup,
    /// A supergroup without a public link.
    PrivateSupergroup,
    /// A supergroup with a public link.
    PublicSupergroup,
    /// A channel without a public link.
    PrivateChannel,
    /// A channel with a public link.
    PublicChannel,
    /// A missing or unrecognized tag.
    Unknown {
        /// The raw tag, empty when absent.
        tag: String,
    },
}

impl ChatKind {
    /// Maps an export `type` tag onto a chat kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "personal_chat" => Self::Personal,
            "bot_chat" => Self::Bot,
            "saved_messages" => Self::SavedMessages,
            "private_group" => Self::PrivateGroup,
            "private_supergroup" => Self::PrivateSupergroup,
            "public_supergroup" => Self::PublicSupergroup,
            "private_channel" => Self::PrivateChannel,
            "public_channel" => Self::PublicChannel,
            other => Self::Unknown { tag: other.to_owned() },
        }
    }

    /// Human-readable label, e.g. "Public Supergroup".
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Personal => "Personal Chat".into(),
            Self::Bot => "Bot Chat".into(),
            Self::SavedMessages => "Saved Messages".into(),
            Self::PrivateGroup => "Private Group".into(),
            Self::PrivateSupergroup => "Private Supergroup".into(),
            Self::PublicSupergroup => "Public Supergroup".into(),
            Self::PrivateChannel => "Private Channel".into(),
            Self::PublicChannel => "Public Channel".into(),
            Self::Unknown { tag } if tag.is_empty() => "Unknown".into(),
            Self::Unknown { tag } => title_case(tag),
        }
    }
}

/// A single record from the `messages` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Telegram message id.
    pub id: Option<i64>,

    /// Display name of the sender (`from`), or of the actor for service
    /// messages.
    pub sender: Option<String>,

    /// When the message was sent.
    pub date: Timestamp,

    /// Id of the message this one replies to.
    pub reply_to: Option<i64>,

    /// Name of the original author when the message was forwarded.
    pub forwarded_from: Option<String>,

    /// Message payload.
    pub kind: MessageKind,
}

/// The payload of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A regular message with rich text and an optional attachment.
    Text {
        /// Rich-text body. Empty for media messages; their text is the caption.
        body: Vec<Span>,
        /// Attachment descriptor, if any.
        media: Option<Media>,
    },

    /// A group event such as a join or a title change.
    Service {
        /// What happened.
        action: ServiceAction,
    },
}

/// A parsed message timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Timestamp {
    /// A timestamp that parsed successfully.
    Parsed(NaiveDateTime),
    /// A date string that could not be parsed, kept verbatim.
    Raw(String),
    /// No date at all.
    #[default]
    Missing,
}

impl Timestamp {
    /// Returns the parsed value, if any.
    #[must_use]
    pub const fn parsed(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Parsed(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Raw(raw) => f.write_str(raw),
            Self::Missing => f.write_str("unknown date"),
        }
    }
}

/// A contiguous run of text with a single formatting kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// How the text is formatted.
    pub kind: SpanKind,
    /// The visible text.
    pub text: String,
}

impl Span {
    /// Creates an unformatted span.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: SpanKind::Plain,
            text: text.into(),
        }
    }
}

/// Formatting kinds found in Telegram rich text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    /// Unformatted text.
    Plain,
    /// Bold text.
    Bold,
    /// Italic text.
    Italic,
    /// Inline monospace.
    Code,
    /// A preformatted block.
    Pre {
        /// Language hint for syntax highlighting.
        language: Option<String>,
    },
    /// Text pointing at a URL different from the text itself.
    TextLink {
        /// The link target.
        href: String,
    },
    /// A bare URL.
    Link,
    /// An `@username` mention.
    Mention,
    /// A mention of a user without a username.
    MentionName,
    /// A `#hashtag`.
    Hashtag,
    /// An e-mail address.
    Email,
    /// A phone number.
    Phone,
    /// Struck-through text.
    Strikethrough,
    /// Underlined text.
    Underline,
    /// Text hidden behind a spoiler.
    Spoiler,
    /// A custom emoji; the text is its fallback emoji.
    CustomEmoji,
    /// An unrecognized span type, rendered as plain text.
    Other {
        /// The raw span type.
        kind: String,
    },
}

/// An attachment descriptor. The binary attachment itself is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// What was attached.
    pub kind: MediaKind,
    /// Text sent along with the attachment.
    pub caption: Option<Vec<Span>>,
}

/// Kinds of attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    /// A photo.
    Photo,
    /// A sticker.
    Sticker {
        /// Emoji associated with the sticker.
        emoji: Option<String>,
    },
    /// A voice note.
    VoiceMessage {
        /// Length in seconds.
        duration: u64,
    },
    /// A round video note.
    VideoMessage {
        /// Length in seconds.
        duration: u64,
    },
    /// A GIF animation.
    Animation,
    /// A video file.
    Video,
    /// An audio track.
    Audio {
        /// Track title.
        title: String,
        /// Track performer.
        performer: Option<String>,
    },
    /// A generic document.
    File {
        /// File name.
        name: String,
    },
    /// A shared location.
    Location {
        /// Latitude as exported.
        latitude: String,
        /// Longitude as exported.
        longitude: String,
    },
    /// A shared contact.
    Contact {
        /// Full name.
        name: String,
        /// Phone number.
        phone: String,
    },
    /// A poll.
    Poll {
        /// The poll question.
        question: String,
    },
    /// An unrecognized `media_type`.
    Unknown {
        /// The raw media type.
        kind: String,
    },
}

/// Actions recorded by service messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAction {
    /// The group was created.
    CreateGroup {
        /// Initial title.
        title: String,
    },
    /// Members were added.
    InviteMembers {
        /// Names of the added members.
        members: Vec<String>,
    },
    /// Members were removed.
    RemoveMembers {
        /// Names of the removed members.
        members: Vec<String>,
    },
    /// The actor joined through an invite link.
    JoinGroupByLink,
    /// The actor left.
    LeaveGroup,
    /// A message was pinned.
    PinMessage,
    /// The title changed.
    EditGroupTitle {
        /// The new title.
        title: String,
    },
    /// The group photo changed.
    EditGroupPhoto,
    /// The group photo was removed.
    DeleteGroupPhoto,
    /// History continues from a basic group.
    MigrateFromGroup,
    /// The group was upgraded to a supergroup.
    MigrateToSupergroup,
    /// A voice call took place.
    PhoneCall {
        /// Call length in seconds, if it connected.
        duration: Option<u64>,
    },
    /// A game score was posted.
    ScoreInGame {
        /// The score.
        score: Option<i64>,
    },
    /// The user allowed a bot to message them.
    BotAllowed,
    /// An unrecognized action.
    Unknown {
        /// The raw action tag.
        action: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ContactInformation {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    phone_number: String,
}

impl Message {
    /// Builds a message from a JSON value, never failing.
    ///
    /// Non-object values produce an empty text message so the record count
    /// is preserved.
    fn from_value(value: &Value) -> Self {
        let msg_type = get_str(value, &["type"]).unwrap_or("message");

        let sender = get_string(value, &["from"]).or_else(|| get_string(value, &["actor"]));
        let date = parse_timestamp(
            get_str(value, &["date"]),
            get_str(value, &["date_unixtime"]),
        );

        let kind = match msg_type {
            "service" => MessageKind::Service {
                action: parse_action(value),
            },
            "message" => parse_text_message(value),
            other if value.get("action").is_some() => {
                debug!(kind = other, "unknown message type with action, loading as service");
                MessageKind::Service {
                    action: parse_action(value),
                }
            }
            other => {
                debug!(kind = other, "unknown message type, loading as text");
                parse_text_message(value)
            }
        };

        Self {
            id: get_i64(value, &["id"]),
            sender,
            date,
            reply_to: get_i64(value, &["reply_to_message_id"]),
            forwarded_from: get_string(value, &["forwarded_from"]),
            kind,
        }
    }
}

fn parse_text_message(value: &Value) -> MessageKind {
    let text = parse_rich_text(value.get("text"));

    match parse_media_kind(value) {
        Some(kind) => MessageKind::Text {
            body: Vec::new(),
            media: Some(Media {
                kind,
                caption: (!text.is_empty()).then_some(text),
            }),
        },
        None => MessageKind::Text {
            body: text,
            media: None,
        },
    }
}

/// Parses Telegram's `text` field, which is either a string or an array of
/// strings and span objects.
fn parse_rich_text(value: Option<&Value>) -> Vec<Span> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![Span::plain(s.as_str())],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(parse_span)
            .filter(|span| !span.text.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_span(item: &Value) -> Option<Span> {
    match item {
        Value::String(s) => Some(Span::plain(s.as_str())),
        Value::Object(_) => {
            let text = get_string(item, &["text"]).unwrap_or_default();
            let kind = match get_str(item, &["type"]).unwrap_or("plain") {
                "plain" => SpanKind::Plain,
                "bold" => SpanKind::Bold,
                "italic" => SpanKind::Italic,
                "code" => SpanKind::Code,
                "pre" => SpanKind::Pre {
                    language: get_string(item, &["language"]).filter(|l| !l.is_empty()),
                },
                "text_link" => SpanKind::TextLink {
                    href: get_string(item, &["href"]).unwrap_or_default(),
                },
                "link" => SpanKind::Link,
                "mention" => SpanKind::Mention,
                "mention_name" => SpanKind::MentionName,
                "hashtag" => SpanKind::Hashtag,
                "email" => SpanKind::Email,
                "phone" => SpanKind::Phone,
                "strikethrough" => SpanKind::Strikethrough,
                "underline" => SpanKind::Underline,
                "spoiler" => SpanKind::Spoiler,
                "custom_emoji" => SpanKind::CustomEmoji,
                other => {
                    debug!(kind = other, "unknown span type, rendering as plain text");
                    SpanKind::Other {
                        kind: other.to_owned(),
                    }
                }
            };
            Some(Span { kind, text })
        }
        _ => None,
    }
}

/// Detects the attachment kind. `media_type` wins over the presence checks;
/// an unknown `media_type` only applies when no other marker matched.
fn parse_media_kind(value: &Value) -> Option<MediaKind> {
    let media_type = get_str(value, &["media_type"]);
    let duration = || get_u64(value, &["duration_seconds"]).unwrap_or(0);

    match media_type {
        Some("sticker") => {
            return Some(MediaKind::Sticker {
                emoji: get_string(value, &["sticker_emoji"]),
            });
        }
        Some("voice_message") => return Some(MediaKind::VoiceMessage { duration: duration() }),
        Some("video_message") => return Some(MediaKind::VideoMessage { duration: duration() }),
        Some("animation") => return Some(MediaKind::Animation),
        Some("video_file") => return Some(MediaKind::Video),
        Some("audio_file") => {
            return Some(MediaKind::Audio {
                title: get_string(value, &["title"]).unwrap_or_else(|| "Audio".into()),
                performer: get_string(value, &["performer"]).filter(|p| !p.is_empty()),
            });
        }
        _ => {}
    }

    if value.get("photo").is_some() {
        return Some(MediaKind::Photo);
    }

    if value.get("file").is_some() {
        let name = get_string(value, &["file_name"])
            .or_else(|| get_string(value, &["file"]))
            .unwrap_or_else(|| "File".into());
        return Some(MediaKind::File { name });
    }

    if let Some(loc) = value.get("location_information") {
        return Some(MediaKind::Location {
            latitude: loc.get("latitude").and_then(scalar_string).unwrap_or_default(),
            longitude: loc.get("longitude").and_then(scalar_string).unwrap_or_default(),
        });
    }

    if let Some(contact) = value.get("contact_information") {
        let info: ContactInformation = serde_json::from_value(contact.clone()).unwrap_or_default();
        return Some(MediaKind::Contact {
            name: format!("{} {}", info.first_name, info.last_name).trim().to_owned(),
            phone: info.phone_number,
        });
    }

    if value.get("poll").is_some() {
        return Some(MediaKind::Poll {
            question: get_string(value, &["poll", "question"]).unwrap_or_else(|| "Poll".into()),
        });
    }

    media_type.map(|kind| {
        debug!(kind, "unknown media type, rendering generic placeholder");
        MediaKind::Unknown {
            kind: kind.to_owned(),
        }
    })
}

fn parse_action(value: &Value) -> ServiceAction {
    let title = || get_string(value, &["title"]).unwrap_or_default();
    let members = || {
        value
            .get("members")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    };

    match get_str(value, &["action"]).unwrap_or("") {
        "create_group" => ServiceAction::CreateGroup { title: title() },
        "invite_members" => ServiceAction::InviteMembers { members: members() },
        "remove_members" => ServiceAction::RemoveMembers { members: members() },
        "join_group_by_link" => ServiceAction::JoinGroupByLink,
        "leave_group" => ServiceAction::LeaveGroup,
        "pin_message" => ServiceAction::PinMessage,
        "edit_group_title" => ServiceAction::EditGroupTitle { title: title() },
        "edit_group_photo" => ServiceAction::EditGroupPhoto,
        "delete_group_photo" => ServiceAction::DeleteGroupPhoto,
        "migrate_from_group" => ServiceAction::MigrateFromGroup,
        "migrate_to_supergroup" => ServiceAction::MigrateToSupergroup,
        "phone_call" => ServiceAction::PhoneCall {
            duration: get_u64(value, &["duration_seconds"]),
        },
        "score_in_game" => ServiceAction::ScoreInGame {
            score: get_i64(value, &["score"]),
        },
        "bot_allowed" => ServiceAction::BotAllowed,
        other => {
            debug!(action = other, "unknown service action, rendering generic event");
            ServiceAction::Unknown {
                action: other.to_owned(),
            }
        }
    }
}

/// Parses the ISO `date` field, falling back to `date_unixtime`.
///
/// Offsets, when present, are dropped rather than converted so the rendered
/// time matches what the exporting client showed.
fn parse_timestamp(date: Option<&str>, unixtime: Option<&str>) -> Timestamp {
    let parsed = date
        .and_then(|d| {
            NaiveDateTime::parse_from_str(d, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .or_else(|| DateTime::parse_from_rfc3339(d).ok().map(|dt| dt.naive_local()))
        })
        .or_else(|| {
            unixtime
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.naive_utc())
        });

    match (parsed, date) {
        (Some(dt), _) => Timestamp::Parsed(dt),
        (None, Some(raw)) if !raw.is_empty() => Timestamp::Raw(raw.to_owned()),
        _ => Timestamp::Missing,
    }
}

/// Turns `snake_case` tags into "Title Case" labels.
fn title_case(tag: &str) -> String {
    tag.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Navigates a JSON path and returns the value at the end.
fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    Some(current)
}

/// Navigates a JSON path and returns the string value at the end.
fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    get_path(value, path)?.as_str()
}

/// Like [`get_str`] but returns an owned `String`.
fn get_string(value: &Value, path: &[&str]) -> Option<String> {
    get_str(value, path).map(str::to_owned)
}

/// Reads an integer that may have been exported as a number or a string.
fn get_i64(value: &Value, path: &[&str]) -> Option<i64> {
    let v = get_path(value, path)?;
    v.as_i64().or_else(|| v.as_str()?.parse().ok())
}

fn get_u64(value: &Value, path: &[&str]) -> Option<u64> {
    let v = get_path(value, path)?;
    v.as_u64().or_else(|| v.as_str()?.parse().ok())
}

/// Renders a JSON string or number without quotes.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parses a JSON string into a [`ChatExport`] structure.
///
/// This is the main entry point for loading Telegram chat exports. Chat
/// metadata is optional; only the `messages` array is required.
///
/// # Errors
///
/// Returns an error if the JSON is malformed, the top level is not an
/// object, or the `messages` array is missing.
///
/// # Example
///
/// ```
/// use tg2md::parser::{ChatKind, parse_chat};
///
/// let chat = parse_chat(r#"{"type": "private_group", "messages": []}"#).unwrap();
/// assert_eq!(chat.name, "Telegram Chat");
/// assert_eq!(chat.kind, ChatKind::PrivateGroup);
/// ```
pub fn parse_chat(json_str: &str) -> Result<ChatExport, MalformedInputError> {
    let root: Value = serde_json::from_str(json_str).context(JsonSnafu)?;

    ensure!(
        root.is_object(),
        NotAnObjectSnafu {
            found: json_type_name(&root)
        }
    );

    let messages = root
        .get("messages")
        .and_then(Value::as_array)
        .context(MissingMessagesSnafu)?
        .iter()
        .map(Message::from_value)
        .collect::<Vec<_>>();

    let name = get_string(&root, &["name"])
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_CHAT_NAME.into());
    let kind = ChatKind::from_tag(get_str(&root, &["type"]).unwrap_or(""));
    let id = get_i64(&root, &["id"]);

    debug!(messages = messages.len(), %name, "loaded chat export");

    Ok(ChatExport::new(name, kind, id, messages))
}
