//! Message types for the nanobot message bus
//!
//! Inbound messages flow from channels (and cron, and sub-agents) to the
//! agent; outbound messages flow from the agent back to channels.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents an incoming message from any source (channel, cron, sub-agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g. "telegram", "system")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Attached media items
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
    /// Optional override for session routing (used by cron and sub-agents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_override: Option<String>,
    /// Additional metadata key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Creates a new inbound message with the required fields.
    ///
    /// # Example
    /// ```
    /// use nanobot::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello, bot!");
    /// assert_eq!(msg.session_key(), "telegram:chat456");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            session_key_override: None,
            metadata: HashMap::new(),
        }
    }

    /// The routing key for session management: the explicit override when
    /// set, otherwise `"channel:chat_id"`.
    pub fn session_key(&self) -> String {
        match &self.session_key_override {
            Some(key) if !key.is_empty() => key.clone(),
            _ => format!("{}:{}", self.channel, self.chat_id),
        }
    }

    /// Attaches a media item (builder pattern).
    pub fn with_media(mut self, media: Media) -> Self {
        self.media.push(media);
        self
    }

    /// Sets the session key override (builder pattern).
    pub fn with_session_key(mut self, key: &str) -> Self {
        self.session_key_override = Some(key.to_string());
        self
    }

    /// Adds a metadata key-value pair (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Checks if this message has any media attached.
    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }
}

/// An attached media item. Consumers resolve it lazily: inline bytes win
/// over a URL, and a URL may be remote (http/https) or a local path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    /// The kind of media
    pub kind: MediaKind,
    /// URL or local filesystem path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// MIME type, if known (auto-detected otherwise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Raw inline bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

/// Kinds of media that can be attached to messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    File,
}

impl Media {
    /// Creates a new media item of the given kind.
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            url: None,
            mime_type: None,
            data: None,
        }
    }

    /// Sets the URL or local path (builder pattern).
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Sets the MIME type (builder pattern).
    pub fn with_mime_type(mut self, mime: &str) -> Self {
        self.mime_type = Some(mime.to_string());
        self
    }

    /// Sets raw inline bytes (builder pattern).
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }
}

/// The type tag of an outbound message. Only `Text` and `Error` reach end
/// users; `Progress` and `ToolHint` are in-process observability and are
/// filtered by the channel manager.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    #[default]
    Text,
    Progress,
    ToolHint,
    Error,
}

impl OutboundKind {
    /// Whether this kind should be delivered to end users.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, OutboundKind::Text | OutboundKind::Error)
    }
}

/// Represents an outgoing message to be sent via a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Message type tag
    #[serde(default)]
    pub kind: OutboundKind,
    /// Optional message ID to reply to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Additional metadata key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    /// Creates a new text outbound message.
    ///
    /// # Example
    /// ```
    /// use nanobot::bus::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello from the bot!");
    /// assert_eq!(msg.channel, "telegram");
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            kind: OutboundKind::Text,
            reply_to: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates an error outbound message.
    pub fn error(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            kind: OutboundKind::Error,
            ..Self::new(channel, chat_id, content)
        }
    }

    /// Sets the kind tag (builder pattern).
    pub fn with_kind(mut self, kind: OutboundKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the message ID to reply to (builder pattern).
    pub fn with_reply(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Creates an outbound text message as a response to an inbound message.
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self::new(&msg.channel, &msg.chat_id, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.sender_id, "user123");
        assert_eq!(msg.chat_id, "chat456");
        assert_eq!(msg.content, "Hello");
        assert!(msg.media.is_empty());
        assert!(msg.metadata.is_empty());
        assert_eq!(msg.session_key(), "telegram:chat456");
    }

    #[test]
    fn test_session_key_override() {
        let msg = InboundMessage::new("system", "cron", "none", "ping")
            .with_session_key("telegram:99999");
        assert_eq!(msg.session_key(), "telegram:99999");
    }

    #[test]
    fn test_empty_override_falls_back() {
        let mut msg = InboundMessage::new("discord", "u", "c", "x");
        msg.session_key_override = Some(String::new());
        assert_eq!(msg.session_key(), "discord:c");
    }

    #[test]
    fn test_inbound_with_media() {
        let media = Media::new(MediaKind::Image)
            .with_url("https://example.com/image.png")
            .with_mime_type("image/png");

        let msg = InboundMessage::new("discord", "user1", "channel1", "Check this")
            .with_media(media);

        assert!(msg.has_media());
        assert_eq!(msg.media[0].kind, MediaKind::Image);
        assert_eq!(
            msg.media[0].url,
            Some("https://example.com/image.png".to_string())
        );
    }

    #[test]
    fn test_inbound_with_metadata() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello")
            .with_metadata("message_id", "12345")
            .with_metadata("source", "cron");

        assert_eq!(msg.metadata.len(), 2);
        assert_eq!(msg.metadata.get("message_id"), Some(&"12345".to_string()));
    }

    #[test]
    fn test_outbound_message_creation() {
        let msg = OutboundMessage::new("telegram", "chat456", "Response");
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "chat456");
        assert_eq!(msg.content, "Response");
        assert_eq!(msg.kind, OutboundKind::Text);
        assert!(msg.reply_to.is_none());
    }

    #[test]
    fn test_outbound_error() {
        let msg = OutboundMessage::error("telegram", "chat456", "boom");
        assert_eq!(msg.kind, OutboundKind::Error);
        assert!(msg.kind.is_user_visible());
    }

    #[test]
    fn test_outbound_kind_visibility() {
        assert!(OutboundKind::Text.is_user_visible());
        assert!(OutboundKind::Error.is_user_visible());
        assert!(!OutboundKind::Progress.is_user_visible());
        assert!(!OutboundKind::ToolHint.is_user_visible());
    }

    #[test]
    fn test_outbound_kind_serde() {
        let json = serde_json::to_string(&OutboundKind::ToolHint).unwrap();
        assert_eq!(json, r#""tool_hint""#);
        let back: OutboundKind = serde_json::from_str(r#""progress""#).unwrap();
        assert_eq!(back, OutboundKind::Progress);
    }

    #[test]
    fn test_outbound_reply_to_inbound() {
        let inbound = InboundMessage::new("telegram", "user123", "chat456", "Hello");
        let response = OutboundMessage::reply_to(&inbound, "Hello back!");

        assert_eq!(response.channel, "telegram");
        assert_eq!(response.chat_id, "chat456");
        assert_eq!(response.content, "Hello back!");
    }

    #[test]
    fn test_media_builder() {
        let media = Media::new(MediaKind::Audio)
            .with_url("https://example.com/audio.mp3")
            .with_data(vec![1, 2, 3, 4]);

        assert_eq!(media.kind, MediaKind::Audio);
        assert!(media.url.is_some());
        assert!(media.data.is_some());
        assert!(media.mime_type.is_none());
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello")
            .with_metadata("key", "value")
            .with_session_key("other:chat");

        let json = serde_json::to_string(&msg).expect("serialize");
        let parsed: InboundMessage = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.channel, "telegram");
        assert_eq!(parsed.session_key(), "other:chat");
        assert_eq!(parsed.metadata.get("key"), Some(&"value".to_string()));
    }
}
