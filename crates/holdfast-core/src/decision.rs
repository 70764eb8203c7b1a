//! Decision orchestration: one decision per live agent per tick.
//!
//! For each agent the orchestrator builds an [`Observation`], fingerprints
//! it, and asks the [`DecisionCache`] to resolve it. On a miss the agent's
//! bound [`ReasoningProvider`] is called under a per-call deadline:
//!
//! 1. A reply that parses into a valid [`Decision`] is used and cached.
//! 2. A transient transport failure is retried up to `retry_count` times
//!    after a fixed backoff.
//! 3. A timeout, invalid output, or any other provider error falls back to
//!    the survival heuristic immediately. Fallbacks are never cached.
//!
//! Agents are resolved concurrently, at most `concurrency_limit` at a time.
//! Results are returned keyed by [`AgentId`], so the caller's iteration
//! order is independent of which provider answered first.
//!
//! A provider call that misses its deadline is dropped at the deadline.
//! Whatever it would have returned is discarded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use holdfast_runner::{
    ProviderError, ProviderRegistry, ReasoningProvider, SurvivalThresholds, parse_decision,
    survival_decision,
};
use holdfast_types::{AgentId, Decision, Observation, WorldState};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheStatus, Computation, DecisionCache, fingerprint};
use crate::config::SimulationConfig;
use crate::observation::ObservationBuilder;

/// How one agent's decision was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    /// The decision to apply.
    pub decision: Decision,
    /// Whether the survival heuristic stood in for the provider.
    pub used_fallback: bool,
    /// Why the fallback was used.
    pub fallback_reason: Option<String>,
    /// Provider the agent is bound to.
    pub provider_id: String,
    /// Cache outcome.
    pub cache_status: CacheStatus,
    /// Time spent resolving, in milliseconds.
    pub latency_ms: u64,
    /// Prompt tokens, when the provider reported them.
    pub tokens_in: Option<u32>,
    /// Completion tokens, when the provider reported them.
    pub tokens_out: Option<u32>,
    /// Provider calls made for this decision. Zero for cache hits.
    pub attempts: u32,
}

impl DecisionOutcome {
    /// Whether no provider call was started for this agent.
    pub const fn cache_hit(&self) -> bool {
        self.cache_status.is_hit()
    }
}

/// Timeout, retry, and fallback settings for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionPolicy {
    /// Deadline for a single provider call.
    pub provider_timeout: Duration,
    /// Extra attempts after a transient failure.
    pub retry_count: u32,
    /// Pause before each retry.
    pub retry_backoff: Duration,
    /// Maximum agents resolved at once.
    pub concurrency_limit: usize,
    /// Thresholds for the fallback heuristic.
    pub thresholds: SurvivalThresholds,
}

impl DecisionPolicy {
    /// The policy described by `config`.
    pub const fn from_config(config: &SimulationConfig) -> Self {
        Self {
            provider_timeout: config.decision.provider_timeout(),
            retry_count: config.decision.retry_count,
            retry_backoff: config.decision.retry_backoff(),
            concurrency_limit: config.decision.concurrency_limit,
            thresholds: config.survival_thresholds(),
        }
    }
}

/// Resolves decisions for every live agent in a tick.
#[derive(Debug, Clone)]
pub struct DecisionOrchestrator {
    registry: ProviderRegistry,
    cache: DecisionCache,
    observations: ObservationBuilder,
    policy: DecisionPolicy,
}

impl DecisionOrchestrator {
    /// An orchestrator configured from `config`.
    pub fn new(registry: ProviderRegistry, config: &SimulationConfig) -> Self {
        Self {
            registry,
            cache: DecisionCache::new(config.decision.cache_ttl(), config.decision.cache_capacity),
            observations: ObservationBuilder::new(config.observation.clone()),
            policy: DecisionPolicy::from_config(config),
        }
    }

    /// Pick up a reloaded configuration. Cached entries survive.
    pub fn configure(&mut self, config: &SimulationConfig) {
        self.observations = ObservationBuilder::new(config.observation.clone());
        self.policy = DecisionPolicy::from_config(config);
        self.cache
            .configure(config.decision.cache_ttl(), config.decision.cache_capacity);
    }

    /// Policy in force.
    pub const fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// The decision cache.
    pub const fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Provider bindings.
    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Provider bindings, for rebinding agents between ticks.
    pub const fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    /// Resolve one decision for each of `agent_ids`.
    ///
    /// Never fails: every requested agent gets an outcome, falling back to
    /// the survival heuristic (or to idling, when no observation can be
    /// built) as needed.
    pub async fn decide_all(
        &self,
        agent_ids: &[AgentId],
        world: &WorldState,
        tick: u64,
    ) -> BTreeMap<AgentId, DecisionOutcome> {
        let limit = self.policy.concurrency_limit.max(1);
        futures::stream::iter(agent_ids.iter().copied())
            .map(|agent_id| async move { (agent_id, self.decide(agent_id, world, tick).await) })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Resolve a single agent's decision.
    pub async fn decide(
        &self,
        agent_id: AgentId,
        world: &WorldState,
        tick: u64,
    ) -> DecisionOutcome {
        let started = Instant::now();
        let provider = Arc::clone(self.registry.provider_for(agent_id));
        let provider_id = provider.id().to_owned();

        let observation = match self.observations.build(agent_id, world, tick) {
            Ok(observation) => observation,
            Err(err) => {
                warn!(agent_id = %agent_id, tick, error = %err, "no observation, agent idles");
                let computation =
                    fallback(Decision::idle("no observation"), format!("observation: {err}"), 0);
                return report(computation, provider_id, CacheStatus::Computed, started);
            }
        };

        let work = consult(provider, observation.clone(), self.policy);
        let (computation, status) = match fingerprint(&observation, &provider_id) {
            Ok(key) => self.cache.resolve(&key, &provider_id, move || work).await,
            Err(err) => {
                warn!(
                    agent_id = %agent_id,
                    tick,
                    error = %err,
                    "fingerprint failed, bypassing cache"
                );
                (work.await, CacheStatus::Computed)
            }
        };

        let outcome = report(computation, provider_id, status, started);
        if let Some(reason) = &outcome.fallback_reason {
            warn!(
                agent_id = %agent_id,
                tick,
                provider = %outcome.provider_id,
                reason = %reason,
                attempts = outcome.attempts,
                action = %outcome.decision.action.action_type(),
                "provider failed, using fallback decision"
            );
        } else {
            debug!(
                agent_id = %agent_id,
                tick,
                provider = %outcome.provider_id,
                cache = ?outcome.cache_status,
                latency_ms = outcome.latency_ms,
                tokens_in = ?outcome.tokens_in,
                tokens_out = ?outcome.tokens_out,
                action = %outcome.decision.action.action_type(),
                "decision resolved"
            );
        }
        outcome
    }
}

/// Ask `provider` for a decision, retrying transient failures and falling
/// back to the survival heuristic on anything else.
async fn consult(
    provider: Arc<ReasoningProvider>,
    observation: Observation,
    policy: DecisionPolicy,
) -> Computation {
    let prompt = match observation.render() {
        Ok(prompt) => prompt,
        Err(err) => {
            let decision = survival_decision(&observation, policy.thresholds);
            return fallback(decision, format!("render: {err}"), 0);
        }
    };

    let mut attempts: u32 = 0;
    let reason = loop {
        attempts = attempts.saturating_add(1);
        let call = provider.decide(&prompt, policy.provider_timeout);
        let error = match tokio::time::timeout(policy.provider_timeout, call).await {
            Ok(Ok(reply)) => match parse_decision(&reply.text) {
                Ok(decision) => {
                    return Computation {
                        decision,
                        fallback_reason: None,
                        tokens_in: reply.tokens_in,
                        tokens_out: reply.tokens_out,
                        attempts,
                    };
                }
                Err(err) => break format!("invalid_output: {err}"),
            },
            Ok(Err(err)) => err,
            Err(_elapsed) => ProviderError::Timeout {
                provider: provider.id().to_owned(),
                after_ms: u64::try_from(policy.provider_timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        if error.is_transient() && attempts <= policy.retry_count {
            debug!(
                provider = %provider.id(),
                attempt = attempts,
                error = %error,
                "transient provider failure, retrying"
            );
            tokio::time::sleep(policy.retry_backoff).await;
            continue;
        }
        break format!("{}: {error}", error.kind());
    };

    let decision = survival_decision(&observation, policy.thresholds);
    fallback(decision, reason, attempts)
}

const fn fallback(decision: Decision, reason: String, attempts: u32) -> Computation {
    Computation {
        decision,
        fallback_reason: Some(reason),
        tokens_in: None,
        tokens_out: None,
        attempts,
    }
}

fn report(
    computation: Computation,
    provider_id: String,
    cache_status: CacheStatus,
    started: Instant,
) -> DecisionOutcome {
    let Computation {
        decision,
        fallback_reason,
        tokens_in,
        tokens_out,
        attempts,
    } = computation;
    // Coalesced waiters report their own latency but not the leader's calls.
    let attempts = if cache_status.is_hit() { 0 } else { attempts };
    DecisionOutcome {
        decision,
        used_fallback: fallback_reason.is_some(),
        fallback_reason,
        provider_id,
        cache_status,
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        tokens_in,
        tokens_out,
        attempts,
    }
}
