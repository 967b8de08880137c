//! One-stop construction of the bridge from configuration.

use std::sync::Arc;

use crate::adapter::WalletAdapter;
use crate::auth::{AuthOrchestrator, DefaultContinuation, SessionState, SessionStore};
use crate::config::BridgeConfig;
use crate::embedded::{EmbeddedProvider, KeyManagementSdk};
use crate::error::WalletError;
use crate::external::{ExternalWalletProvider, ProtocolTransport, WalletProtocol};
use crate::provider::{OnLogin, WalletProvider};
use crate::registry::{PlatformCapabilities, ProviderRegistry};
use crate::rpc::{JsonRpcClient, RpcEndpoint};
use crate::status::StatusSink;
use crate::transaction::{SendOptions, TransactionRequest, TransactionService};
use crate::types::{AuthResult, LoginMethod};

/// Platform hooks and backend implementations supplied by the host app.
pub struct BridgeBackends {
    pub platform: Arc<dyn PlatformCapabilities>,
    pub embedded_sdk: Option<Arc<dyn KeyManagementSdk>>,
    pub wallet_protocol: Option<Arc<dyn WalletProtocol>>,
    /// Overrides the JSON-RPC client built from `rpc_url`.
    pub rpc: Option<Arc<dyn RpcEndpoint>>,
    pub extra_providers: Vec<Arc<dyn WalletProvider>>,
}

impl BridgeBackends {
    pub fn new(platform: Arc<dyn PlatformCapabilities>) -> Self {
        Self {
            platform,
            embedded_sdk: None,
            wallet_protocol: None,
            rpc: None,
            extra_providers: Vec::new(),
        }
    }

    pub fn with_embedded_sdk(mut self, sdk: Arc<dyn KeyManagementSdk>) -> Self {
        self.embedded_sdk = Some(sdk);
        self
    }

    pub fn with_wallet_protocol(mut self, protocol: Arc<dyn WalletProtocol>) -> Self {
        self.wallet_protocol = Some(protocol);
        self
    }

    pub fn with_rpc(mut self, rpc: Arc<dyn RpcEndpoint>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.extra_providers.push(provider);
        self
    }
}

pub struct WalletBridge {
    config: BridgeConfig,
    registry: Arc<ProviderRegistry>,
    transactions: Arc<TransactionService>,
    rpc: Arc<dyn RpcEndpoint>,
    auth: AuthOrchestrator,
}

impl WalletBridge {
    /// Build the registry, initialize every provider and wire up auth.
    ///
    /// `on_login` runs after a login when the caller gives no continuation.
    pub async fn build(
        config: BridgeConfig,
        backends: BridgeBackends,
        on_login: DefaultContinuation,
    ) -> Result<Self, WalletError> {
        config.validate()?;

        let transactions = Arc::new(TransactionService::new(
            config.signing_policy,
            config.confirm_delay(),
        ));

        let mut registry = ProviderRegistry::new();
        if let Some(sdk) = backends.embedded_sdk {
            registry.register(Arc::new(EmbeddedProvider::new(sdk, Arc::clone(&transactions))));
        }
        if let Some(protocol) = backends.wallet_protocol {
            let transport = ProtocolTransport::new(
                protocol,
                config.app_identity.clone(),
                config.cluster.clone(),
                config.send.external_broadcast,
            );
            registry.register(Arc::new(ExternalWalletProvider::new(
                Arc::clone(&backends.platform),
                transport,
                Arc::clone(&transactions),
            )));
        }
        for provider in backends.extra_providers {
            registry.register(provider);
        }

        if !registry.has_provider(&config.selected_provider) {
            return Err(WalletError::ProviderNotRegistered(config.selected_provider.clone()));
        }

        let mut restored: Option<AuthResult> = None;
        for provider in registry.available_providers() {
            match provider.initialize().await {
                Ok(Some(result)) => {
                    // The selected provider's session wins over any other.
                    let replace = restored.is_none()
                        || result.provider_kind == config.selected_provider;
                    if replace {
                        restored = Some(result);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = %provider.kind(), error = %e, "provider initialization failed");
                }
            }
        }

        let rpc: Arc<dyn RpcEndpoint> = match backends.rpc {
            Some(rpc) => rpc,
            None => Arc::new(JsonRpcClient::new(config.rpc_url.clone(), config.rpc_timeout())?),
        };

        let registry = Arc::new(registry);
        let auth = AuthOrchestrator::new(
            Arc::clone(&registry),
            config.selected_provider.clone(),
            SessionStore::default(),
            on_login,
        );
        if let Some(result) = &restored {
            auth.restore(result);
        }

        tracing::info!(
            platform = backends.platform.platform_name(),
            providers = registry.len(),
            selected = %config.selected_provider,
            policy = ?config.signing_policy,
            "wallet bridge ready"
        );

        Ok(Self {
            config,
            registry,
            transactions,
            rpc,
            auth,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn transactions(&self) -> &Arc<TransactionService> {
        &self.transactions
    }

    pub fn rpc(&self) -> &Arc<dyn RpcEndpoint> {
        &self.rpc
    }

    pub fn auth(&self) -> &AuthOrchestrator {
        &self.auth
    }

    pub fn session(&self) -> SessionState {
        self.auth.session()
    }

    pub fn available_providers(&self) -> Vec<Arc<dyn WalletProvider>> {
        self.registry.available_providers()
    }

    pub async fn login(
        &self,
        method: LoginMethod,
        status: Option<StatusSink>,
        on_success: Option<OnLogin>,
    ) -> Result<AuthResult, WalletError> {
        self.auth.login(method, status, on_success).await
    }

    pub async fn logout(&self, status: Option<StatusSink>) -> Result<(), WalletError> {
        self.auth.logout(status).await
    }

    /// Send options seeded from the `[send]` config section.
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            confirm_after_send: self.config.send.confirm_after_send,
            max_retries: self.config.send.max_retries,
            ..SendOptions::default()
        }
    }

    /// The provider the live session uses, falling back to the selected one.
    fn active_provider(&self) -> Result<Arc<dyn WalletProvider>, WalletError> {
        match self.session().provider_kind {
            Some(kind) => self.registry.require(&kind),
            None => self.auth.selected_provider(),
        }
    }

    pub fn current_wallet(&self) -> Option<WalletAdapter> {
        self.active_provider().ok()?.current_wallet()
    }

    pub async fn sign_and_send(
        &self,
        request: TransactionRequest,
        options: SendOptions,
    ) -> Result<String, WalletError> {
        let provider = self.active_provider()?;
        provider
            .sign_and_send_transaction(request, self.rpc.as_ref(), options)
            .await
    }
}
