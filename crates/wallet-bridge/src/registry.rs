//! Lookup table of wallet backends, built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WalletError;
use crate::provider::WalletProvider;
use crate::types::ProviderKind;

/// What the host platform supports.
pub trait PlatformCapabilities: Send + Sync {
    fn platform_name(&self) -> &str;

    /// Whether a separate wallet application can be reached over the
    /// authorization protocol.
    fn supports_external_wallet_protocol(&self) -> bool;
}

/// Fixed capability answers, typically filled from build target or config.
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    pub name: String,
    pub external_wallet_protocol: bool,
}

impl StaticPlatform {
    pub fn new(name: impl Into<String>, external_wallet_protocol: bool) -> Self {
        Self {
            name: name.into(),
            external_wallet_protocol,
        }
    }
}

impl PlatformCapabilities for StaticPlatform {
    fn platform_name(&self) -> &str {
        &self.name
    }

    fn supports_external_wallet_protocol(&self) -> bool {
        self.external_wallet_protocol
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn WalletProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a provider under its kind. Last write wins.
    pub fn register(&mut self, provider: Arc<dyn WalletProvider>) {
        let kind = provider.kind();
        if self.providers.insert(kind.clone(), provider).is_some() {
            tracing::warn!(provider = %kind, "provider re-registered, replacing previous entry");
        } else {
            tracing::debug!(provider = %kind, "provider registered");
        }
    }

    pub fn get_provider(&self, kind: &ProviderKind) -> Option<Arc<dyn WalletProvider>> {
        self.providers.get(kind).cloned()
    }

    pub fn get_all_providers(&self) -> Vec<Arc<dyn WalletProvider>> {
        self.providers.values().cloned().collect()
    }

    pub fn has_provider(&self, kind: &ProviderKind) -> bool {
        self.providers.contains_key(kind)
    }

    /// Providers the UI may offer on this platform.
    pub fn available_providers(&self) -> Vec<Arc<dyn WalletProvider>> {
        self.providers
            .values()
            .filter(|p| p.is_available())
            .cloned()
            .collect()
    }

    pub fn require(&self, kind: &ProviderKind) -> Result<Arc<dyn WalletProvider>, WalletError> {
        self.get_provider(kind)
            .ok_or_else(|| WalletError::ProviderNotRegistered(kind.clone()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
