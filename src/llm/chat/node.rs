use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::error::Error as StdError;

use super::{ ChatClient, ChatCompletionResponse, CompletionMessage };
use super::openai::DEFAULT_MODEL;
use crate::llm::LlmConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3003";
pub const CHAT_ROUTE: &str = "/api/chat";
pub const CHAT_MOCK_ROUTE: &str = "/api/chat-mock";

/// Talks to the chat backend that sits behind the development proxy. The
/// backend holds the provider key, so no credentials are sent from here.
#[derive(Debug)]
pub struct NodeChatClient {
    http: HttpClient,
    base_url: String,
    route: &'static str,
    model: String,
}

#[derive(Serialize)]
struct NodeChatRequest<'a> {
    messages: &'a [CompletionMessage],
    model: &'a str,
}

impl NodeChatClient {
    pub fn new(base_url: Option<String>, model: Option<String>, route: &'static str) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            route,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(Self::new(config.base_url.clone(), config.completion_model.clone(), CHAT_ROUTE))
    }

    pub fn mock_from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(Self::new(config.base_url.clone(), config.completion_model.clone(), CHAT_MOCK_ROUTE))
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.route)
    }
}

#[async_trait]
impl ChatClient for NodeChatClient {
    async fn complete(
        &self,
        messages: &[CompletionMessage]
    ) -> Result<CompletionMessage, Box<dyn StdError + Send + Sync>> {
        let url = self.url();
        let req = NodeChatRequest { messages, model: &self.model };

        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await?
            .error_for_status()?
            .json::<ChatCompletionResponse>().await?;
        debug!("completion {:?}", resp);

        Ok(resp.into_first_message(&url)?)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
