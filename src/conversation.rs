//! Conversation corpus schema, transcript cleaning, and the windowing engine
//!
//! Conversations arrive from the external corpus collaborator as ordered
//! `{sender, text, timestamp?}` records grouped under a source label. This
//! module owns everything between that raw input and the bounded, truncated
//! message window that gets resolved into platform markup.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which side of the chat a message renders on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Sent,
    Received,
}

impl Sender {
    /// CSS class used by the templates for this side
    pub fn css_class(self) -> &'static str {
        match self {
            Sender::Sent => "sent",
            Sender::Received => "received",
        }
    }

}

/// One transcript message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "speaker")]
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// One conversation as it appears in the corpus file
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub id: Option<String>,
    /// Source label the corpus groups by (e.g. a subreddit name)
    #[serde(default, alias = "source")]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub messages: Vec<Message>,
}

/// Top-level corpus file: a labelled set of conversations
#[derive(Debug, Clone, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub source: Option<String>,
    pub conversations: Vec<ConversationRecord>,
}

impl Corpus {
    /// Parse a corpus JSON document (the converter's output format)
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Keep only conversations whose source label is in `allowed`.
    /// An empty filter keeps everything.
    pub fn filter_sources(&mut self, allowed: &[String]) {
        if allowed.is_empty() {
            return;
        }
        self.conversations.retain(|c| {
            c.subreddit
                .as_deref()
                .map(|s| allowed.iter().any(|a| a == s))
                .unwrap_or(false)
        });
    }

    /// Clean every conversation into render-ready threads, dropping
    /// conversations that have no usable messages left after cleaning.
    pub fn into_threads(self) -> Vec<ConversationThread> {
        self.conversations
            .into_iter()
            .filter_map(ConversationThread::from_record)
            .collect()
    }
}

/// Strip corpus markup from a raw message and decide whether it is usable.
///
/// Returns `None` for deleted/removed placeholders and for messages that
/// are empty (or nearly so) once markdown emphasis, quote markers, bare
/// URLs, and subreddit/user mentions are removed.
pub fn clean_text(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    if matches!(
        lowered.as_str(),
        "[deleted]" | "[removed]" | "deleted" | "removed"
    ) {
        return None;
    }

    let stripped = raw
        .replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace("```", "")
        .replace('`', "");

    let mut out = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let line = line.trim_start().trim_start_matches('>').trim_start();
        for word in line.split_whitespace() {
            if word.starts_with("http://") || word.starts_with("https://") {
                continue;
            }
            if word.starts_with("/r/")
                || word.starts_with("r/")
                || word.starts_with("/u/")
                || word.starts_with("u/")
            {
                continue;
            }
            let word = word.trim_matches('*');
            if word.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }

    if out.chars().count() < 3 {
        None
    } else {
        Some(out)
    }
}

/// Truncate `text` to at most `max_chars` characters, ellipsis included.
///
/// The budget is a static approximation of the template's
/// character-to-height ratio; it is counted in chars, not bytes, so
/// multi-byte text never splits a code point.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// An ordered transcript with the point where the evidence image attaches.
///
/// Immutable once loaded; jobs reference it read-only through an `Arc`.
#[derive(Debug, Clone)]
pub struct ConversationThread {
    pub messages: Vec<Message>,
    /// Index of the message the image attaches after
    pub insertion_index: usize,
}

impl ConversationThread {
    /// Build a thread from a raw corpus record, cleaning each message.
    ///
    /// The corpus does not carry an insertion point, so it defaults to the
    /// midpoint of the cleaned transcript. Returns `None` when cleaning
    /// leaves nothing to render.
    pub fn from_record(record: ConversationRecord) -> Option<Self> {
        let messages: Vec<Message> = record
            .messages
            .into_iter()
            .filter_map(|m| {
                clean_text(&m.text).map(|text| Message {
                    sender: m.sender,
                    text,
                    timestamp: m.timestamp,
                })
            })
            .collect();
        if messages.is_empty() {
            return None;
        }
        let insertion_index = messages.len() / 2;
        Some(Self {
            messages,
            insertion_index,
        })
    }

    /// Built-in fallback transcript used when no corpus is supplied
    pub fn fallback() -> Self {
        let lines: [(&str, Sender); 8] = [
            ("Hey, check this out", Sender::Received),
            ("What is it?", Sender::Sent),
            ("Look at this", Sender::Received),
            ("Interesting", Sender::Sent),
            ("What do you think?", Sender::Received),
            ("Thanks for sharing", Sender::Sent),
            ("Let me know what you think", Sender::Received),
            ("Will do", Sender::Sent),
        ];
        let messages = lines
            .iter()
            .map(|(text, sender)| Message {
                sender: *sender,
                text: (*text).to_string(),
                timestamp: None,
            })
            .collect::<Vec<_>>();
        let insertion_index = messages.len() / 2;
        Self {
            messages,
            insertion_index,
        }
    }

    /// Select the bounded window of messages around the insertion point.
    ///
    /// The window spans `[max(0, idx-before) ..= min(len-1, idx+after)]`;
    /// a conversation shorter than the requested window yields whatever it
    /// has rather than erroring. Every retained message is truncated to
    /// `max_chars`.
    pub fn window(&self, before: usize, after: usize, max_chars: usize) -> Result<MessageWindow> {
        let len = self.messages.len();
        let idx = self.insertion_index;
        if idx >= len {
            return Err(Error::InvalidInsertionIndex { index: idx, len });
        }

        let lo = idx.saturating_sub(before);
        let hi = std::cmp::min(len - 1, idx.saturating_add(after));

        let messages = self.messages[lo..=hi]
            .iter()
            .map(|m| Message {
                sender: m.sender,
                text: truncate_text(&m.text, max_chars),
                timestamp: m.timestamp.clone(),
            })
            .collect();

        Ok(MessageWindow {
            messages,
            image_after: idx - lo,
        })
    }
}

/// The bounded slice of messages surrounding the evidence image.
///
/// `image_after` is the index (within `messages`) of the message the image
/// bubble renders directly after.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageWindow {
    pub messages: Vec<Message>,
    pub image_after: usize,
}
