//! Provider configuration loaded from the environment.
//!
//! Credentials never live in the simulation YAML. The engine reads them
//! here and builds the default [`ReasoningProvider`](crate::ReasoningProvider).

use crate::error::ProviderError;

/// Default sampling temperature for remote models.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default completion budget in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Which provider implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `OpenAI`-compatible chat completions API (`OpenAI`, `DeepSeek`, Ollama).
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Local deterministic survival heuristic.
    Heuristic,
}

impl ProviderKind {
    /// Parse a backend name as accepted in `HOLDFAST_PROVIDER`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "openai" | "deepseek" | "ollama" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "heuristic" | "local" => Some(Self::Heuristic),
            _ => None,
        }
    }
}

/// Configuration for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Implementation to build.
    pub kind: ProviderKind,
    /// Base API URL (e.g. `https://api.openai.com/v1`). Empty for the heuristic.
    pub api_url: String,
    /// API key. Empty for the heuristic.
    pub api_key: String,
    /// Model identifier. Empty for the heuristic.
    pub model: String,
    /// Sampling temperature for decision calls.
    pub temperature: f32,
    /// Completion budget for decision calls.
    pub max_tokens: u32,
}

impl ProviderConfig {
    /// The local heuristic provider.
    pub fn heuristic() -> Self {
        Self {
            kind: ProviderKind::Heuristic,
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// - `HOLDFAST_PROVIDER` -- `openai`, `anthropic`, or `heuristic` (default `heuristic`)
    /// - `HOLDFAST_API_URL` -- API base URL (required for remote providers)
    /// - `HOLDFAST_API_KEY` -- API key (required for remote providers)
    /// - `HOLDFAST_MODEL` -- model name (required for remote providers)
    /// - `HOLDFAST_MAX_TOKENS` -- completion budget (default 256)
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProviderError> {
        let kind = match lookup("HOLDFAST_PROVIDER") {
            None => ProviderKind::Heuristic,
            Some(raw) => ProviderKind::parse(&raw)
                .ok_or_else(|| ProviderError::Config(format!("unknown provider: {raw}")))?,
        };
        let max_tokens = match lookup("HOLDFAST_MAX_TOKENS") {
            None => DEFAULT_MAX_TOKENS,
            Some(raw) => raw
                .parse()
                .map_err(|e| ProviderError::Config(format!("invalid HOLDFAST_MAX_TOKENS: {e}")))?,
        };
        if kind == ProviderKind::Heuristic {
            return Ok(Self {
                max_tokens,
                ..Self::heuristic()
            });
        }

        let required = |name: &str| {
            lookup(name)
                .ok_or_else(|| ProviderError::Config(format!("missing required env var {name}")))
        };
        Ok(Self {
            kind,
            api_url: required("HOLDFAST_API_URL")?,
            api_key: required("HOLDFAST_API_KEY")?,
            model: required("HOLDFAST_MODEL")?,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_heuristic() {
        let cfg = ProviderConfig::from_lookup(lookup(&[]))
            .unwrap_or_else(|_| ProviderConfig::heuristic());
        assert_eq!(cfg.kind, ProviderKind::Heuristic);
        assert_eq!(cfg.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn remote_provider_requires_credentials() {
        let result = ProviderConfig::from_lookup(lookup(&[("HOLDFAST_PROVIDER", "anthropic")]));
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn remote_provider_loads() {
        let cfg = ProviderConfig::from_lookup(lookup(&[
            ("HOLDFAST_PROVIDER", "OpenAI"),
            ("HOLDFAST_API_URL", "https://api.openai.com/v1"),
            ("HOLDFAST_API_KEY", "sk-test"),
            ("HOLDFAST_MODEL", "gpt-test"),
        ]));
        assert!(cfg.is_ok());
        if let Ok(cfg) = cfg {
            assert_eq!(cfg.kind, ProviderKind::OpenAi);
            assert_eq!(cfg.model, "gpt-test");
        }
    }

    #[test]
    fn unknown_provider_rejected() {
        let result = ProviderConfig::from_lookup(lookup(&[("HOLDFAST_PROVIDER", "oracle")]));
        assert!(result.is_err());
    }
}
