use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown message role: '{}'", other)),
        }
    }
}

/// How the content of a message should be rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Markdown,
    Code,
}

impl ContentType {
    /// Guesses the rendering type of a reply. A reply that is a single fenced
    /// block is code, anything carrying block-level markdown is markdown.
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim();
        if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() > 6 {
            let inner = &trimmed[3..trimmed.len() - 3];
            if !inner.contains("```") {
                return ContentType::Code;
            }
        }

        let has_markdown = trimmed.lines().any(|line| {
            let line = line.trim_start();
            is_heading(line) ||
                line.starts_with("- ") ||
                line.starts_with("* ") ||
                line.starts_with("> ") ||
                line.starts_with("```") ||
                line.starts_with('|') ||
                is_ordered_item(line)
        });

        if has_markdown {
            ContentType::Markdown
        } else {
            ContentType::Text
        }
    }
}

fn is_heading(line: &str) -> bool {
    let level = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&level) && line[level..].starts_with(' ')
}

fn is_ordered_item(line: &str) -> bool {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with(". ")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Left,
    Right,
    Center,
    Pop,
}

/// The persisted form of a chat turn. Only these fields survive a round
/// trip through a conversation store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            position: None,
            content_type: None,
            id: None,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(title: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            id: None,
            title: title.into(),
            messages,
        }
    }
}

/// Partial update of a stored conversation. Absent fields are left as they are.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
}

impl ConversationPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), messages: None }
    }

    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self { title: None, messages: Some(messages) }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.messages.is_none()
    }

    pub fn apply(self, conversation: &mut Conversation) {
        if let Some(title) = self.title {
            conversation.title = title;
        }
        if let Some(messages) = self.messages {
            conversation.messages = messages;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_uses_wire_field_names() {
        let mut msg = ChatMessage::new(Role::Assistant, "hi");
        msg.id = Some("abc".into());
        msg.content_type = Some(ContentType::Markdown);
        msg.position = Some(Position::Left);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["_id"], "abc");
        assert_eq!(json["type"], "markdown");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["position"], "left");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn detects_content_types() {
        assert_eq!(ContentType::detect("just words"), ContentType::Text);
        assert_eq!(ContentType::detect("# Title\n\nbody"), ContentType::Markdown);
        assert_eq!(ContentType::detect("steps:\n1. one\n2. two"), ContentType::Markdown);
        assert_eq!(
            ContentType::detect("```python\nprint(\"x\")\n```"),
            ContentType::Code
        );
        assert_eq!(
            ContentType::detect("```a```\ntext\n```b```"),
            ContentType::Markdown
        );
    }

    #[test]
    fn hash_prefixed_words_are_not_headings() {
        assert_eq!(ContentType::detect("#rustlang is trending"), ContentType::Text);
        assert_eq!(ContentType::detect("#include <stdio.h>"), ContentType::Text);
        assert_eq!(ContentType::detect("### Section"), ContentType::Markdown);
        assert_eq!(ContentType::detect("####### too deep"), ContentType::Text);
    }

    #[test]
    fn patch_touches_only_present_fields() {
        let mut conversation = Conversation::new(
            "first",
            vec![ChatMessage::new(Role::User, "hello")]
        );
        ConversationPatch::title("renamed").apply(&mut conversation);
        assert_eq!(conversation.title, "renamed");
        assert_eq!(conversation.messages.len(), 1);

        ConversationPatch::messages(Vec::new()).apply(&mut conversation);
        assert_eq!(conversation.title, "renamed");
        assert!(conversation.messages.is_empty());
    }
}
