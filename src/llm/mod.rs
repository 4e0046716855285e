pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmType {
    /// OpenAI-compatible completion API called directly (Moonshot by default).
    OpenAI,
    /// The chat backend behind the development proxy.
    Node,
    /// The backend's mock route, with a local placeholder when it fails.
    NodeMock,
    /// Placeholder replies only, no network.
    LocalMock,
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::OpenAI => "openai",
            LlmType::Node => "node",
            LlmType::NodeMock => "node-mock",
            LlmType::LocalMock => "local-mock",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "moonshot" => Ok(LlmType::OpenAI),
            "node" | "llm-node" => Ok(LlmType::Node),
            "node-mock" => Ok(LlmType::NodeMock),
            "local-mock" | "mock" => Ok(LlmType::LocalMock),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    /// Substitute a placeholder reply when the remote call fails.
    pub fallback: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::OpenAI,
            api_key: None,
            completion_model: None,
            base_url: None,
            temperature: None,
            fallback: false,
        }
    }
}
