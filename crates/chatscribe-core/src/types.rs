//! Domain types shared by the extraction engine and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Streaming platforms a target can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Twitch,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "twitch" => Some(Self::Twitch),
            _ => None,
        }
    }

    /// URL of the standalone chat page for a channel handle.
    pub fn chat_url(&self, handle: &str) -> String {
        match self {
            Self::Twitch => format!("https://www.twitch.tv/popout/{}/chat", handle),
        }
    }

    /// Markup of the live message list.
    pub fn chat_markup(&self) -> ChatMarkup {
        match self {
            Self::Twitch => ChatMarkup {
                message: "div.chat-line__message".into(),
                author_attribute: "data-a-user".into(),
                body_pieces: "span[data-a-target=chat-line-message-body] > *".into(),
                emote: "img.chat-image".into(),
                emote_text_attribute: "alt".into(),
            },
        }
    }

    /// Markup of the viewers panel.
    pub fn viewer_markup(&self) -> ViewerMarkup {
        match self {
            Self::Twitch => ViewerMarkup {
                activate: "[aria-label=\"Users in Chat\"]".into(),
                panel: "div.chat-viewers__list".into(),
                entry: "div.chat-viewers__list button.chat-viewers-list__button".into(),
                identity_attribute: "data-username".into(),
            },
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Selectors describing a chat message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMarkup {
    /// One element per message, oldest first.
    pub message: String,
    pub author_attribute: String,
    /// Content pieces of a message body, relative to the message element.
    pub body_pieces: String,
    /// Non-text piece (inline emote), relative to a body piece.
    pub emote: String,
    pub emote_text_attribute: String,
}

/// Selectors describing the viewers panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerMarkup {
    pub activate: String,
    pub panel: String,
    pub entry: String,
    pub identity_attribute: String,
}

/// Normalize a participant handle: trimmed, lowercase.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase()
}

/// A participant handle as stored. Unique system-wide by `handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub handle: String,
}

/// One monitored chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub identity: Identity,
    pub platform: Platform,
}

impl Target {
    pub fn handle(&self) -> &str {
        &self.identity.handle
    }

    pub fn chat_url(&self) -> String {
        self.platform.chat_url(self.handle())
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.identity.handle)
    }
}

/// A chat message read off the surface, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub author: String,
    pub body: String,
    pub observed_at: DateTime<Utc>,
}

/// One appearance of a viewer in a snapshot, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSighting {
    pub handle: String,
    /// Shared by every sighting of the same snapshot.
    pub observed_at: DateTime<Utc>,
}
