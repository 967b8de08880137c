//! Provider backed by a hosted key-management service.
//!
//! The service's SDK owns the keys and the user session. This provider drives
//! its login flows, makes sure a wallet exists, and exposes it as a
//! [`WalletAdapter`] whose transport is the SDK's fixed [`Capability`].

pub mod local;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chain_sol::decode_account_address;
use secrecy::SecretString;
use serde_json::Value;

use crate::adapter::{Capability, WalletAdapter, WalletTransport};
use crate::error::WalletError;
use crate::provider::{LoginOptions, StateCell, WalletProvider};
use crate::rpc::RpcEndpoint;
use crate::status::{StatusNarrator, StatusSink};
use crate::transaction::{SendOptions, TransactionRequest, TransactionService};
use crate::types::{AuthResult, LoginMethod, ProfileHints, ProviderKind, ProviderStatus};

pub use local::LocalKeyManager;

/// The signed-in user as reported by the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkUser {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedWalletHandle {
    pub address: String,
    /// Whatever the SDK returns; passed through as the adapter's raw handle.
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedWalletState {
    NotCreated,
    /// The wallet exists but must be recovered on this device first.
    NeedsRecovery,
    Ready(EmbeddedWalletHandle),
}

#[async_trait]
pub trait KeyManagementSdk: Send + Sync {
    /// Resume a session persisted by the SDK, if any.
    async fn restore_session(&self) -> Result<Option<SdkUser>, WalletError>;

    async fn login_with_oauth(&self, provider: &str) -> Result<SdkUser, WalletError>;

    async fn login_with_credential(
        &self,
        identifier: &str,
        secret: &SecretString,
    ) -> Result<SdkUser, WalletError>;

    async fn wallet_state(&self) -> Result<EmbeddedWalletState, WalletError>;

    async fn create_wallet(&self) -> Result<EmbeddedWalletHandle, WalletError>;

    async fn logout(&self) -> Result<(), WalletError>;

    /// How this SDK accepts sign requests.
    fn capability(&self) -> Capability;
}

pub struct EmbeddedProvider {
    sdk: Arc<dyn KeyManagementSdk>,
    transactions: Arc<TransactionService>,
    state: StateCell,
    user: Mutex<Option<SdkUser>>,
}

impl EmbeddedProvider {
    pub fn new(sdk: Arc<dyn KeyManagementSdk>, transactions: Arc<TransactionService>) -> Self {
        Self {
            sdk,
            transactions,
            state: StateCell::new(ProviderKind::EmbeddedCustodial),
            user: Mutex::new(None),
        }
    }

    fn user(&self) -> Option<SdkUser> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_user(&self, user: Option<SdkUser>) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user;
    }

    async fn authenticate(&self, method: &LoginMethod) -> Result<SdkUser, WalletError> {
        match method {
            LoginMethod::OAuth { provider } => self.sdk.login_with_oauth(provider).await,
            LoginMethod::Credential { identifier, secret } => {
                self.sdk.login_with_credential(identifier, secret).await
            }
            LoginMethod::ExternalWallet => Err(WalletError::Authorization(
                "embedded wallets do not accept external wallet login".into(),
            )),
        }
    }

    /// Find or create the wallet. `None` when it needs recovery.
    async fn ensure_wallet(
        &self,
        narrator: &StatusNarrator,
    ) -> Result<Option<WalletAdapter>, WalletError> {
        let handle = match self.sdk.wallet_state().await? {
            EmbeddedWalletState::Ready(handle) => handle,
            EmbeddedWalletState::NotCreated => {
                narrator.emit("Creating wallet...");
                let handle = self.sdk.create_wallet().await?;
                tracing::info!(address = %handle.address, "embedded wallet created");
                handle
            }
            EmbeddedWalletState::NeedsRecovery => {
                tracing::info!("embedded wallet needs recovery");
                return Ok(None);
            }
        };

        let key = decode_account_address(&handle.address)
            .map_err(|e| WalletError::Connection(e.to_string()))?;
        let adapter = WalletAdapter::new(
            ProviderKind::EmbeddedCustodial,
            WalletTransport::Capability(self.sdk.capability()),
        )
        .with_account(key.to_address(), key)
        .with_raw_handle(handle.raw);
        Ok(Some(adapter))
    }

    /// Connect assuming a session exists. On `None` the status is left at
    /// `Connecting` for the caller to settle.
    async fn connect(
        &self,
        narrator: &StatusNarrator,
    ) -> Result<Option<WalletAdapter>, WalletError> {
        if let Some(wallet) = self.state.wallet() {
            return Ok(Some(wallet));
        }

        if self.state.status() != ProviderStatus::Connecting {
            self.state.begin_attempt();
        }
        match self.ensure_wallet(narrator).await {
            Ok(Some(adapter)) => {
                self.state.connected(adapter.clone());
                Ok(Some(adapter))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.state.failed();
                Err(e)
            }
        }
    }

    /// [`Self::connect`], dropping back to `Disconnected` when recovery is
    /// needed.
    async fn connect_or_settle(
        &self,
        narrator: &StatusNarrator,
    ) -> Result<Option<WalletAdapter>, WalletError> {
        let wallet = self.connect(narrator).await?;
        if wallet.is_none() {
            self.state.transition(ProviderStatus::Disconnected);
        }
        Ok(wallet)
    }

    async fn login_inner(
        &self,
        method: &LoginMethod,
        narrator: &StatusNarrator,
    ) -> Result<AuthResult, WalletError> {
        narrator.emit("Signing in...");
        let user = self.authenticate(method).await?;
        tracing::info!(user = %user.id, method = method.label(), "embedded login succeeded");
        self.set_user(Some(user.clone()));

        narrator.emit("Loading wallet...");
        let adapter = self
            .connect(narrator)
            .await?
            .ok_or_else(|| WalletError::Connection("wallet requires recovery".into()))?;

        Ok(auth_result(&adapter, user))
    }

    /// Refuse to reconnect after a failed attempt; only a new login clears `Error`.
    fn ensure_not_failed(&self) -> Result<(), WalletError> {
        if self.state.status() == ProviderStatus::Error {
            return Err(WalletError::Connection(
                "previous sign-in failed, log in again".into(),
            ));
        }
        Ok(())
    }
}

fn auth_result(adapter: &WalletAdapter, user: SdkUser) -> AuthResult {
    AuthResult {
        provider_kind: ProviderKind::EmbeddedCustodial,
        address: adapter.address().unwrap_or_default().to_string(),
        profile: ProfileHints {
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        },
    }
}

#[async_trait]
impl WalletProvider for EmbeddedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::EmbeddedCustodial
    }

    fn status(&self) -> ProviderStatus {
        self.state.status()
    }

    async fn initialize(&self) -> Result<Option<AuthResult>, WalletError> {
        let Some(user) = self.sdk.restore_session().await? else {
            tracing::debug!("no embedded session to restore");
            return Ok(None);
        };
        tracing::info!(user = %user.id, "restoring embedded session");
        self.set_user(Some(user.clone()));
        let wallet = self
            .connect_or_settle(&StatusNarrator::for_login(None))
            .await?;
        Ok(wallet.map(|adapter| auth_result(&adapter, user)))
    }

    async fn login(&self, options: LoginOptions) -> Result<AuthResult, WalletError> {
        let narrator = StatusNarrator::for_login(options.status.clone());
        // A fresh login may belong to a different user.
        self.state.reset();
        self.state.begin_attempt();

        match self.login_inner(&options.method, &narrator).await {
            Ok(result) => {
                narrator.emit("Signed in");
                if let Some(on_success) = options.on_success {
                    on_success(&result);
                }
                Ok(result)
            }
            Err(e) => {
                self.state.failed();
                narrator.fail(&e);
                Err(e)
            }
        }
    }

    async fn logout(&self, status: Option<StatusSink>) -> Result<(), WalletError> {
        let narrator = StatusNarrator::for_login(status);
        let result = self.sdk.logout().await;
        self.set_user(None);
        self.state.reset();

        if let Err(e) = &result {
            tracing::warn!(error = %e, "embedded logout failed, session cleared locally");
        }
        narrator.emit("Signed out");
        result
    }

    async fn connect_wallet(
        &self,
        status: Option<StatusSink>,
    ) -> Result<Option<WalletAdapter>, WalletError> {
        if let Some(wallet) = self.state.wallet() {
            return Ok(Some(wallet));
        }
        if self.user().is_none() {
            return Err(WalletError::Connection("no embedded session, log in first".into()));
        }
        self.ensure_not_failed()?;
        let narrator = StatusNarrator::for_login(status);
        self.connect_or_settle(&narrator)
            .await
            .inspect_err(|e| narrator.fail(e))
    }

    fn current_wallet(&self) -> Option<WalletAdapter> {
        self.state.wallet()
    }

    async fn sign_and_send_transaction(
        &self,
        tx: TransactionRequest,
        rpc: &dyn RpcEndpoint,
        options: SendOptions,
    ) -> Result<String, WalletError> {
        let adapter = self
            .state
            .wallet()
            .ok_or_else(|| WalletError::Connection("no wallet connected".into()))?;
        self.transactions
            .sign_and_send(&adapter, tx, rpc, &options)
            .await
    }
}
