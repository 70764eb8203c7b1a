//! Per-agent provider bindings.

use std::collections::BTreeMap;
use std::sync::Arc;

use holdfast_types::AgentId;

use crate::provider::ReasoningProvider;

/// Maps agents to the provider that decides for them.
///
/// Agents without an explicit binding use the default provider.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    default: Arc<ReasoningProvider>,
    bindings: BTreeMap<AgentId, Arc<ReasoningProvider>>,
}

impl ProviderRegistry {
    /// A registry where every agent uses `default`.
    pub const fn new(default: Arc<ReasoningProvider>) -> Self {
        Self {
            default,
            bindings: BTreeMap::new(),
        }
    }

    /// Bind `agent` to `provider`, replacing any earlier binding.
    pub fn bind(&mut self, agent: AgentId, provider: Arc<ReasoningProvider>) {
        self.bindings.insert(agent, provider);
    }

    /// Drop the binding for `agent`, returning it to the default.
    pub fn unbind(&mut self, agent: AgentId) -> Option<Arc<ReasoningProvider>> {
        self.bindings.remove(&agent)
    }

    /// The provider deciding for `agent`.
    pub fn provider_for(&self, agent: AgentId) -> &Arc<ReasoningProvider> {
        self.bindings.get(&agent).unwrap_or(&self.default)
    }

    /// The default provider.
    pub const fn default_provider(&self) -> &Arc<ReasoningProvider> {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{HeuristicProvider, ScriptedProvider};

    #[test]
    fn bindings_override_default() {
        let default = Arc::new(ReasoningProvider::Heuristic(HeuristicProvider::default()));
        let scripted = Arc::new(ReasoningProvider::Scripted(ScriptedProvider::new("agent-2")));
        let mut registry = ProviderRegistry::new(default);
        registry.bind(AgentId::new(2), scripted);

        assert_eq!(registry.provider_for(AgentId::new(1)).id(), "heuristic");
        assert_eq!(registry.provider_for(AgentId::new(2)).id(), "agent-2");

        registry.unbind(AgentId::new(2));
        assert_eq!(registry.provider_for(AgentId::new(2)).id(), "heuristic");
    }
}
