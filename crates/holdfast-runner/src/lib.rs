//! Reasoning providers for the Holdfast simulation core.
//!
//! A provider turns an agent's rendered observation into decision text.
//! This crate owns the providers themselves, the schema-validating parser
//! that turns their text into a typed [`Decision`](holdfast_types::Decision),
//! and the deterministic survival heuristic used whenever a provider fails.
//!
//! # Modules
//!
//! - [`provider`] -- `OpenAI`-compatible, Anthropic, heuristic, and scripted providers.
//! - [`registry`] -- Per-agent provider bindings.
//! - [`parse`] -- Provider text to validated decision.
//! - [`heuristic`] -- Survival fallback rules.
//! - [`config`] -- Provider configuration from the environment.
//! - [`error`] -- Provider and parse errors.

pub mod config;
pub mod error;
pub mod heuristic;
pub mod parse;
pub mod provider;
pub mod registry;

pub use config::{ProviderConfig, ProviderKind};
pub use error::{ParseError, ProviderError};
pub use heuristic::{SurvivalRule, SurvivalThresholds, survival_decision};
pub use parse::{parse_decision, render_decision};
pub use provider::{
    AnthropicProvider, HeuristicProvider, OpenAiProvider, ProviderReply, RawPrompt,
    ReasoningProvider, ScriptedProvider, ScriptedReply, create_provider,
};
pub use registry::ProviderRegistry;
