pub mod mock;
pub mod node;
pub mod openai;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use super::{ LlmConfig, LlmType };
use self::mock::{ FallbackChatClient, LocalMockClient };
use self::node::NodeChatClient;
use self::openai::OpenAIChatClient;

/// One `{role, content}` pair as exchanged with a completion endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{0} API key is required")]
    MissingApiKey(&'static str),
    #[error("No response choices from {0}")]
    EmptyChoices(String),
}

#[derive(Deserialize, Debug)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ChatCompletionChoice {
    pub message: CompletionMessage,
}

impl ChatCompletionResponse {
    pub(crate) fn into_first_message(
        self,
        source: &str
    ) -> Result<CompletionMessage, CompletionError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| CompletionError::EmptyChoices(source.to_string()))
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the whole conversation and returns the first choice's message.
    async fn complete(
        &self,
        messages: &[CompletionMessage]
    ) -> Result<CompletionMessage, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Node => {
            let specific_client = NodeChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::NodeMock => {
            let specific_client = NodeChatClient::mock_from_config(config)?;
            return Ok(Arc::new(FallbackChatClient::new(Arc::new(specific_client))));
        }
        LlmType::LocalMock => {
            return Ok(Arc::new(LocalMockClient));
        }
    };

    if config.fallback {
        return Ok(Arc::new(FallbackChatClient::new(client)));
    }
    Ok(client)
}
