//! Provider for wallets that live in a separate application.
//!
//! Keys never enter this process. Each operation opens a short protocol
//! session with the wallet app, authorizes with the application identity and
//! closes the session before returning, on success and failure alike.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chain_sol::{decode_account_address, Pubkey, SolTransaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::adapter::{WalletAdapter, WalletTransport};
use crate::error::WalletError;
use crate::provider::{LoginOptions, StateCell, WalletProvider};
use crate::registry::PlatformCapabilities;
use crate::rpc::RpcEndpoint;
use crate::status::{StatusNarrator, StatusSink};
use crate::transaction::{cancellable, SendOptions, TransactionRequest, TransactionService};
use crate::types::{AppIdentity, AuthResult, LoginMethod, ProfileHints, ProviderKind, ProviderStatus};

/// Who submits the signed transaction to the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// The wallet signs; this process broadcasts through its RPC endpoint.
    #[default]
    App,
    /// The wallet signs and sends.
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedAccount {
    /// As returned by the wallet; Base58 or Base64 of the raw key.
    pub address: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub accounts: Vec<AuthorizedAccount>,
    pub auth_token: Option<String>,
}

/// Entry point of the platform's wallet protocol.
#[async_trait]
pub trait WalletProtocol: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn ProtocolSession>, WalletError>;
}

/// One live association with the wallet application.
#[async_trait]
pub trait ProtocolSession: Send {
    async fn authorize(
        &mut self,
        identity: &AppIdentity,
        cluster: &str,
        auth_token: Option<&str>,
    ) -> Result<Authorization, WalletError>;

    async fn sign_transactions(
        &mut self,
        txs: Vec<SolTransaction>,
    ) -> Result<Vec<SolTransaction>, WalletError>;

    async fn sign_and_send_transactions(
        &mut self,
        txs: Vec<SolTransaction>,
    ) -> Result<Vec<[u8; 64]>, WalletError>;

    async fn deauthorize(&mut self, auth_token: &str) -> Result<(), WalletError>;

    /// Release the association. Best effort.
    async fn close(&mut self);
}

/// Everything needed to reach the wallet app for one round trip.
pub struct ProtocolTransport {
    protocol: Arc<dyn WalletProtocol>,
    identity: AppIdentity,
    cluster: String,
    broadcast: BroadcastMode,
    auth_token: Mutex<Option<String>>,
}

impl ProtocolTransport {
    pub fn new(
        protocol: Arc<dyn WalletProtocol>,
        identity: AppIdentity,
        cluster: impl Into<String>,
        broadcast: BroadcastMode,
    ) -> Self {
        Self {
            protocol,
            identity,
            cluster: cluster.into(),
            broadcast,
            auth_token: Mutex::new(None),
        }
    }

    fn auth_token(&self) -> Option<String> {
        self.auth_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn open(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<Box<dyn ProtocolSession>, WalletError> {
        let session = cancellable(cancel, self.protocol.open_session())
            .await?
            .map_err(|e| match e {
                WalletError::Connection(_) => e,
                other => WalletError::Connection(other.to_string()),
            })?;
        tracing::debug!(cluster = %self.cluster, "wallet session opened");
        Ok(session)
    }

    async fn close(session: &mut dyn ProtocolSession) {
        session.close().await;
        tracing::debug!("wallet session closed");
    }

    /// Authorize and return the first account with its decoded key.
    async fn authorize(
        &self,
        session: &mut dyn ProtocolSession,
    ) -> Result<(AuthorizedAccount, Pubkey), WalletError> {
        let previous = self.auth_token();
        let auth = session
            .authorize(&self.identity, &self.cluster, previous.as_deref())
            .await?;
        if auth.auth_token.is_some() {
            self.set_auth_token(auth.auth_token.clone());
        }

        let account = auth
            .accounts
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::Authorization("wallet authorized zero accounts".into()))?;
        let key = decode_account_address(&account.address)
            .map_err(|e| WalletError::Connection(e.to_string()))?;
        Ok((account, key))
    }

    /// One authorization round trip in a fresh session.
    async fn authorize_once(&self) -> Result<(AuthorizedAccount, Pubkey), WalletError> {
        let mut session = self.open(None).await?;
        let outcome = self.authorize(session.as_mut()).await;
        Self::close(session.as_mut()).await;
        outcome
    }

    async fn deauthorize_once(&self, token: &str) -> Result<(), WalletError> {
        let mut session = self.open(None).await?;
        let outcome = session.deauthorize(token).await;
        Self::close(session.as_mut()).await;
        outcome
    }

    /// Full round trip for one transaction. Returns the Base58 signature.
    ///
    /// The session is closed on every path, including cancellation.
    pub(crate) async fn sign_and_send(
        &self,
        tx: SolTransaction,
        rpc: &dyn RpcEndpoint,
        cancel: Option<&CancellationToken>,
        narrator: &StatusNarrator,
    ) -> Result<String, WalletError> {
        let mut session = self.open(cancel).await?;
        let outcome = cancellable(cancel, self.round_trip(session.as_mut(), tx, rpc, narrator)).await;
        Self::close(session.as_mut()).await;
        outcome?
    }

    async fn round_trip(
        &self,
        session: &mut dyn ProtocolSession,
        tx: SolTransaction,
        rpc: &dyn RpcEndpoint,
        narrator: &StatusNarrator,
    ) -> Result<String, WalletError> {
        narrator.emit("Requesting wallet authorization...");
        let (_, payer) = self.authorize(session).await?;
        let tx = complete_draft(tx, &payer, rpc).await?;

        match self.broadcast {
            BroadcastMode::App => {
                narrator.emit("Waiting for wallet signature...");
                let signed = session
                    .sign_transactions(vec![tx])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| WalletError::Signing("wallet returned no transactions".into()))?;
                let signature = signed.signature_string().ok_or_else(|| {
                    WalletError::Signing("wallet returned an unsigned transaction".into())
                })?;

                narrator.emit("Sending transaction...");
                rpc.send_raw_transaction(&signed.serialize()?).await?;
                Ok(signature)
            }
            BroadcastMode::Wallet => {
                narrator.emit("Waiting for wallet to sign and send...");
                let signatures = session.sign_and_send_transactions(vec![tx]).await?;
                signatures
                    .first()
                    .map(|sig| bs58::encode(sig).into_string())
                    .ok_or_else(|| WalletError::Broadcast("wallet returned no signature".into()))
            }
        }
    }
}

/// Fill in a missing blockhash and fee payer on legacy drafts.
async fn complete_draft(
    mut tx: SolTransaction,
    payer: &Pubkey,
    rpc: &dyn RpcEndpoint,
) -> Result<SolTransaction, WalletError> {
    if let SolTransaction::Legacy(legacy) = &mut tx {
        if !legacy.message.has_recent_blockhash() {
            let blockhash = rpc.latest_blockhash().await?;
            legacy.ensure_recent_blockhash(&blockhash);
            tracing::debug!("filled recent blockhash");
        }
        if legacy.ensure_fee_payer(payer.as_bytes())? {
            tracing::debug!(fee_payer = %payer, "filled fee payer");
        }
    }
    Ok(tx)
}

// ─── Provider ────────────────────────────────────────────────────────

pub struct ExternalWalletProvider {
    platform: Arc<dyn PlatformCapabilities>,
    transport: Arc<ProtocolTransport>,
    transactions: Arc<TransactionService>,
    state: StateCell,
}

impl ExternalWalletProvider {
    pub fn new(
        platform: Arc<dyn PlatformCapabilities>,
        transport: ProtocolTransport,
        transactions: Arc<TransactionService>,
    ) -> Self {
        Self {
            platform,
            transport: Arc::new(transport),
            transactions,
            state: StateCell::new(ProviderKind::ExternalProtocol),
        }
    }

    fn ensure_available(&self) -> Result<(), WalletError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(WalletError::Connection(format!(
                "external wallet protocol is not available on {}",
                self.platform.platform_name()
            )))
        }
    }

    async fn connect(&self, narrator: &StatusNarrator) -> Result<WalletAdapter, WalletError> {
        narrator.emit("Connecting to wallet...");
        let (account, key) = self.transport.authorize_once().await?;

        let address = key.to_address();
        let raw = json!({ "address": account.address, "label": account.label });
        Ok(WalletAdapter::new(
            ProviderKind::ExternalProtocol,
            WalletTransport::Protocol(Arc::clone(&self.transport)),
        )
        .with_account(address, key)
        .with_raw_handle(raw))
    }
}

#[async_trait]
impl WalletProvider for ExternalWalletProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ExternalProtocol
    }

    fn status(&self) -> ProviderStatus {
        self.state.status()
    }

    fn is_available(&self) -> bool {
        self.platform.supports_external_wallet_protocol()
    }

    async fn login(&self, options: LoginOptions) -> Result<AuthResult, WalletError> {
        let narrator = StatusNarrator::for_login(options.status.clone());
        self.ensure_available()?;
        if !matches!(options.method, LoginMethod::ExternalWallet) {
            return Err(WalletError::Authorization(format!(
                "{} login is not supported by external wallets",
                options.method.label()
            )));
        }

        self.state.begin_attempt();
        let adapter = match self.connect(&narrator).await {
            Ok(adapter) => adapter,
            Err(e) => {
                self.state.failed();
                narrator.fail(&e);
                return Err(e);
            }
        };

        let result = AuthResult {
            provider_kind: ProviderKind::ExternalProtocol,
            address: adapter.address().unwrap_or_default().to_string(),
            profile: ProfileHints {
                display_name: adapter.raw_handle()["label"].as_str().map(str::to_string),
                avatar_url: None,
            },
        };
        self.state.connected(adapter);
        narrator.emit("Wallet connected");

        if let Some(on_success) = options.on_success {
            on_success(&result);
        }
        Ok(result)
    }

    async fn logout(&self, status: Option<StatusSink>) -> Result<(), WalletError> {
        let narrator = StatusNarrator::for_login(status);
        let token = self.transport.auth_token();
        self.transport.set_auth_token(None);
        self.state.reset();

        let Some(token) = token else {
            narrator.emit("Signed out");
            return Ok(());
        };
        if !self.is_available() {
            narrator.emit("Signed out");
            return Ok(());
        }

        let result = self.transport.deauthorize_once(&token).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "wallet deauthorization failed");
        }
        narrator.emit("Signed out");
        result
    }

    async fn connect_wallet(
        &self,
        status: Option<StatusSink>,
    ) -> Result<Option<WalletAdapter>, WalletError> {
        self.ensure_available()?;
        if let Some(wallet) = self.state.wallet() {
            return Ok(Some(wallet));
        }

        if self.state.status() == ProviderStatus::Error {
            return Err(WalletError::Connection(
                "previous connection failed, log in again".into(),
            ));
        }

        let narrator = StatusNarrator::for_login(status);
        self.state.begin_attempt();
        match self.connect(&narrator).await {
            Ok(adapter) => {
                self.state.connected(adapter.clone());
                Ok(Some(adapter))
            }
            Err(e) => {
                self.state.failed();
                narrator.fail(&e);
                Err(e)
            }
        }
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
        self.ensure_available()?;
        let adapter = self
            .state
            .wallet()
            .ok_or_else(|| WalletError::Connection("no wallet connected".into()))?;
        self.transactions
            .sign_and_send(&adapter, tx, rpc, &options)
            .await
    }
}
