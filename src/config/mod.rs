use thiserror::Error;
use url::Url;
use crate::cli::Args;

pub const PROXY_API_PREFIX: &str = "/cxyz/chat-llm-node";
pub const BASE_PROJECT_PREFIX: &str = "/projects/chat-llm-vue";
pub const DEFAULT_PROXY_TARGET: &str = "http://localhost:3003";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Path prefix '{0}' must start with '/'")]
    InvalidPrefix(String),
    #[error("Invalid proxy target '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Proxy target '{0}' must be an http(s) origin")]
    UnsupportedTarget(String),
}

/// Static routing for the development proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub prefix: String,
    pub target: Url,
    pub base_path: String,
}

fn normalize_prefix(prefix: &str) -> Result<String, ConfigError> {
    if !prefix.starts_with('/') {
        return Err(ConfigError::InvalidPrefix(prefix.to_string()));
    }
    let trimmed = prefix.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}

impl ProxyConfig {
    pub fn new(prefix: &str, target: &str, base_path: &str) -> Result<Self, ConfigError> {
        let target_url = Url::parse(target).map_err(|source| ConfigError::InvalidTarget {
            target: target.to_string(),
            source,
        })?;
        if !matches!(target_url.scheme(), "http" | "https") || target_url.host_str().is_none() {
            return Err(ConfigError::UnsupportedTarget(target.to_string()));
        }

        Ok(Self {
            prefix: normalize_prefix(prefix)?,
            target: target_url,
            base_path: normalize_prefix(base_path)?,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        Self::new(&args.proxy_prefix, &args.proxy_target, &args.base_path)
    }

    /// Strips the proxy prefix from `path`. Only whole path segments match,
    /// and an empty remainder becomes `/`.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        if self.prefix == "/" {
            return Some(path.to_string());
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some("/".to_string())
        } else if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            None
        }
    }

    /// Upstream URL for a rewritten path and optional query string.
    pub fn upstream_url(&self, rewritten: &str, query: Option<&str>) -> String {
        let origin = self.target.as_str().trim_end_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", origin, rewritten, q),
            _ => format!("{}{}", origin, rewritten),
        }
    }
}
