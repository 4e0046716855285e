use clap::{ Parser, Subcommand };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    // --- History Store Args ---
    /// Conversation store type (sqlite, redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "sqlite", global = true)]
    pub history_type: String,

    /// SQLite file holding the conversation table.
    #[arg(long, env = "HISTORY_DB_PATH", default_value = "chat-llm.db", global = true)]
    pub history_db_path: String,

    /// Redis endpoint for the redis store (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379", global = true)]
    pub history_host: String,

    /// Prefix for Redis conversation keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "chat-llm:", global = true)]
    pub history_redis_prefix: String,

    // --- Chat LLM Provider Args ---
    /// Completion backend (openai, node, node-mock, local-mock)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai", global = true)]
    pub chat_llm_type: String,

    /// Base URL for the completion backend (e.g., https://api.moonshot.cn/v1)
    #[arg(long, env = "CHAT_BASE_URL", global = true)] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the completion provider. Not needed for node backends.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true, global = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., moonshot-v1-8k)
    #[arg(long, env = "CHAT_MODEL", global = true)] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Sampling temperature for direct completions.
    #[arg(long, env = "CHAT_TEMPERATURE", global = true)]
    pub chat_temperature: Option<f32>,

    /// Answer with a local placeholder instead of failing when the backend errors.
    #[arg(long, env = "CHAT_FALLBACK", default_value = "false", global = true)]
    pub chat_fallback: bool,

    // --- Proxy Args ---
    /// Host address and port for the development proxy to listen on.
    #[arg(long, env = "PROXY_ADDR", default_value = "127.0.0.1:5173", global = true)]
    pub proxy_addr: String,

    /// Origin that proxied requests are forwarded to.
    #[arg(long, env = "PROXY_TARGET", default_value = crate::config::DEFAULT_PROXY_TARGET, global = true)]
    pub proxy_target: String,

    /// Path prefix that is proxied and stripped before forwarding.
    #[arg(long, env = "PROXY_PREFIX", default_value = crate::config::PROXY_API_PREFIX, global = true)]
    pub proxy_prefix: String,

    /// Deployment path prefix the static client is served under.
    #[arg(long, env = "BASE_PATH", default_value = crate::config::BASE_PROJECT_PREFIX, global = true)]
    pub base_path: String,

    /// Optional directory of static assets to serve under the base path.
    #[arg(long, env = "STATIC_DIR", global = true)]
    pub static_dir: Option<String>,

    /// Maximum proxied requests per second.
    #[arg(long, env = "PROXY_RATE_LIMIT", default_value = "20", global = true)]
    pub proxy_rate_limit: u32,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH", global = true)]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH", global = true)]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false", global = true)]
    pub enable_tls: bool,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false", global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive chat (the default)
    Chat {
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<i64>,
    },
    /// Send one message and print the reply
    Ask {
        /// Continue an existing conversation instead of starting a new one.
        #[arg(long)]
        conversation: Option<i64>,
        text: Vec<String>,
    },
    /// List stored conversations
    List,
    /// Print one conversation
    Show { id: i64 },
    /// Change a conversation's title
    Rename { id: i64, title: Vec<String> },
    /// Delete one conversation
    Delete { id: i64 },
    /// Delete every conversation
    Clear,
    /// Run the development proxy
    Proxy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_development_setup() {
        let args = Args::parse_from(["chat-llm"]);
        assert_eq!(args.command, None);
        assert_eq!(args.history_type, "sqlite");
        assert_eq!(args.chat_llm_type, "openai");
        assert_eq!(args.proxy_prefix, "/cxyz/chat-llm-node");
        assert_eq!(args.proxy_target, "http://localhost:3003");
        assert_eq!(args.base_path, "/projects/chat-llm-vue");
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let args = Args::parse_from([
            "chat-llm",
            "ask",
            "--chat-llm-type",
            "local-mock",
            "hello",
            "there",
        ]);
        assert_eq!(args.chat_llm_type, "local-mock");
        assert_eq!(
            args.command,
            Some(Command::Ask { conversation: None, text: vec!["hello".into(), "there".into()] })
        );
    }

    #[test]
    fn rename_collects_title_words() {
        let args = Args::parse_from(["chat-llm", "rename", "3", "Trip", "plans"]);
        assert_eq!(args.command, Some(Command::Rename { id: 3, title: vec!["Trip".into(), "plans".into()] }));
    }
}
