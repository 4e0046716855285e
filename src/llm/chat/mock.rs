use async_trait::async_trait;
use log::warn;
use std::error::Error as StdError;
use std::sync::Arc;

use super::{ ChatClient, CompletionMessage };
use crate::messages::id::random_below;

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "labore", "dolore", "magna", "aliqua", "enim", "minim",
    "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi", "aliquip", "commodo",
    "consequat", "duis", "aute", "irure", "reprehenderit", "voluptate", "velit", "esse", "cillum",
    "fugiat", "nulla", "pariatur", "excepteur", "sint", "occaecat", "cupidatat", "proident", "culpa",
];

fn range(min: usize, max: usize) -> usize {
    min + random_below(max - min + 1)
}

fn word() -> &'static str {
    WORDS[random_below(WORDS.len())]
}

fn capitalize(w: &str) -> String {
    let mut chars = w.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A capitalised sentence of `min..=max` words ending in a full stop.
pub fn sentence(min: usize, max: usize) -> String {
    let words: Vec<&str> = (0..range(min, max)).map(|_| word()).collect();
    format!("{}.", capitalize(&words.join(" ")))
}

pub fn title() -> String {
    (0..range(3, 7))
        .map(|_| capitalize(word()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn paragraph() -> String {
    (0..range(3, 7))
        .map(|_| sentence(12, 18))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Placeholder assistant reply shaped as plain text, markdown or code.
pub fn mock_message() -> CompletionMessage {
    let content = match random_below(3) {
        0 => sentence(5, 20),
        1 => format!("# {}\n\n{}\n\n- {}\n- {}\n- {}", title(), paragraph(), word(), word(), word()),
        _ => format!("```python\n{}\nprint(\"{}\")\n```", sentence(12, 18), word()),
    };
    CompletionMessage::new("assistant", content)
}

/// Replies with placeholders and never touches the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMockClient;

#[async_trait]
impl ChatClient for LocalMockClient {
    async fn complete(
        &self,
        _messages: &[CompletionMessage]
    ) -> Result<CompletionMessage, Box<dyn StdError + Send + Sync>> {
        Ok(mock_message())
    }

    fn get_model(&self) -> String {
        "local-mock".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

/// Wraps a client so that any failure becomes a placeholder reply.
pub struct FallbackChatClient {
    inner: Arc<dyn ChatClient>,
}

impl FallbackChatClient {
    pub fn new(inner: Arc<dyn ChatClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChatClient for FallbackChatClient {
    async fn complete(
        &self,
        messages: &[CompletionMessage]
    ) -> Result<CompletionMessage, Box<dyn StdError + Send + Sync>> {
        match self.inner.complete(messages).await {
            Ok(message) => Ok(message),
            Err(e) => {
                warn!("Completion failed, using placeholder reply: {}", e);
                Ok(mock_message())
            }
        }
    }

    fn get_model(&self) -> String {
        self.inner.get_model()
    }

    fn get_base_url(&self) -> Option<String> {
        self.inner.get_base_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::node::{ NodeChatClient, CHAT_MOCK_ROUTE };

    struct Failing;

    #[async_trait]
    impl ChatClient for Failing {
        async fn complete(
            &self,
            _messages: &[CompletionMessage]
        ) -> Result<CompletionMessage, Box<dyn StdError + Send + Sync>> {
            Err("upstream down".into())
        }

        fn get_model(&self) -> String {
            "failing".into()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn failures_become_placeholders() {
        let client = FallbackChatClient::new(Arc::new(Failing));
        let reply = client.complete(&[CompletionMessage::new("user", "hi")]).await.unwrap();
        assert_eq!(reply.role, "assistant");
        assert!(!reply.content.is_empty());
        assert_eq!(client.get_model(), "failing");
    }

    #[tokio::test]
    async fn unreachable_backend_falls_back() {
        // Port 9 (discard) on loopback is closed in test environments.
        let node = NodeChatClient::new(Some("http://127.0.0.1:9".into()), None, CHAT_MOCK_ROUTE);
        let client = FallbackChatClient::new(Arc::new(node));
        let reply = client.complete(&[]).await.unwrap();
        assert_eq!(reply.role, "assistant");
    }

    #[test]
    fn placeholders_take_one_of_three_shapes() {
        for _ in 0..50 {
            let content = mock_message().content;
            let is_code = content.starts_with("```python\n") && content.ends_with("\n```");
            let is_markdown = content.starts_with("# ") && content.matches("\n- ").count() == 3;
            let is_text = content.ends_with('.') && !content.contains('\n');
            assert!(is_code || is_markdown || is_text, "unexpected shape: {}", content);
        }
    }

    #[test]
    fn sentences_respect_word_bounds() {
        for _ in 0..50 {
            let s = sentence(5, 20);
            let count = s.split_whitespace().count();
            assert!((5..=20).contains(&count));
            assert!(s.chars().next().unwrap().is_uppercase());
        }
    }
}
