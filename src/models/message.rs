use serde::{ Serialize, Deserialize };
use std::fmt;

use super::chat::{ ChatMessage, ContentType, Position, Role };

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{}", n),
            MessageId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId::Text(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        MessageId::Text(s)
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        MessageId::Number(n)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Fail,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A message as held by a [`crate::messages::MessageList`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProps {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub role: Role,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub content: String,
    pub created_at: i64,
    pub position: Position,
    pub has_time: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub error: bool,
}

/// A message that has not been through the list manager yet. Missing
/// identifier, timestamp, position and time flag are filled in on insert.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageDraft {
    pub id: Option<MessageId>,
    pub role: Role,
    pub content_type: ContentType,
    pub content: String,
    pub created_at: Option<i64>,
    pub position: Option<Position>,
    pub has_time: Option<bool>,
    pub status: Option<MessageStatus>,
    pub user: Option<User>,
    pub error: bool,
}

impl MessageDraft {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content_type: ContentType::Text,
            content: content.into(),
            created_at: None,
            position: None,
            has_time: None,
            status: None,
            user: None,
            error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content).at_position(Position::Right)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content).at_position(Position::Left)
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn created_at(mut self, ts: i64) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn at_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Forces the timestamp separator regardless of the time gap.
    pub fn with_time(mut self) -> Self {
        self.has_time = Some(true);
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn failed(mut self) -> Self {
        self.error = true;
        self.status = Some(MessageStatus::Fail);
        self
    }
}

impl From<&MessageProps> for ChatMessage {
    fn from(msg: &MessageProps) -> Self {
        ChatMessage {
            role: msg.role,
            content: msg.content.clone(),
            position: Some(msg.position),
            content_type: Some(msg.content_type),
            id: Some(msg.id.to_string()),
            error: if msg.error { Some(true) } else { None },
        }
    }
}

impl From<ChatMessage> for MessageDraft {
    fn from(msg: ChatMessage) -> Self {
        let error = msg.is_error();
        MessageDraft {
            id: msg.id.map(MessageId::Text),
            role: msg.role,
            content_type: msg.content_type.unwrap_or_default(),
            content: msg.content,
            created_at: None,
            position: msg.position,
            has_time: None,
            status: if error { Some(MessageStatus::Fail) } else { None },
            user: None,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_serializes_untagged() {
        assert_eq!(serde_json::to_string(&MessageId::from(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&MessageId::from("k3x")).unwrap(), "\"k3x\"");
        let parsed: MessageId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed, MessageId::Text("abc".into()));
    }

    #[test]
    fn persisted_form_keeps_only_stored_fields() {
        let props = MessageProps {
            id: MessageId::from("m1"),
            role: Role::Assistant,
            content_type: ContentType::Code,
            content: "```x```".into(),
            created_at: 42,
            position: Position::Left,
            has_time: true,
            status: Some(MessageStatus::Fail),
            user: None,
            error: true,
        };
        let stored = ChatMessage::from(&props);
        assert_eq!(stored.id.as_deref(), Some("m1"));
        assert_eq!(stored.error, Some(true));
        assert_eq!(stored.content_type, Some(ContentType::Code));

        let json = serde_json::to_value(&stored).unwrap();
        assert!(json.get("createdAt").is_none());
        assert!(json.get("hasTime").is_none());

        let draft = MessageDraft::from(stored);
        assert!(draft.error);
        assert_eq!(draft.status, Some(MessageStatus::Fail));
        assert_eq!(draft.created_at, None);
    }
}
