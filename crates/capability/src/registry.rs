//! Provider registry and bounded dispatch

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{ActionOutcome, Capability, CapabilityDescriptor, CapabilityError, Params, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Registered providers, keyed by name
pub struct CapabilityRegistry {
    providers: HashMap<String, Arc<dyn Capability>>,
    timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Registry whose invocations give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn register<C: Capability + 'static>(&mut self, provider: C) -> Result<()> {
        self.register_arc(Arc::new(provider))
    }

    pub fn register_arc(&mut self, provider: Arc<dyn Capability>) -> Result<()> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(CapabilityError::DuplicateProvider(name));
        }
        info!(
            "◆ PROVIDER REGISTERED: {} ({} ACTIONS)",
            name,
            provider.actions().len()
        );
        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.providers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Provider names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn supports(&self, provider: &str, action: &str) -> bool {
        self.providers
            .get(provider)
            .map(|p| p.actions().iter().any(|a| a.name == action))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Every provider's action surface, sorted by provider name
    pub fn describe_all(&self) -> Vec<CapabilityDescriptor> {
        let mut descriptors: Vec<CapabilityDescriptor> =
            self.providers.values().map(|p| p.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Dispatch one action, bounded by the registry timeout
    pub async fn invoke(
        &self,
        provider: &str,
        action: &str,
        params: &Params,
    ) -> Result<ActionOutcome> {
        let target = self
            .providers
            .get(provider)
            .ok_or_else(|| CapabilityError::UnknownProvider(provider.to_string()))?;

        if !target.actions().iter().any(|a| a.name == action) {
            return Err(CapabilityError::UnknownAction {
                provider: provider.to_string(),
                action: action.to_string(),
            });
        }

        debug!("◆ DISPATCH {}.{}", provider, action);
        match tokio::time::timeout(self.timeout, target.execute(action, params)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                warn!("◆ {}.{} RAISED: {}", provider, action, e);
                Err(CapabilityError::ProviderExecution {
                    provider: provider.to_string(),
                    action: action.to_string(),
                    detail: e.to_string(),
                })
            }
            Err(_) => Err(CapabilityError::Timeout {
                provider: provider.to_string(),
                action: action.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
