//! The contract every wallet backend implements.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::adapter::WalletAdapter;
use crate::error::WalletError;
use crate::rpc::RpcEndpoint;
use crate::status::StatusSink;
use crate::transaction::{SendOptions, TransactionRequest};
use crate::types::{AuthResult, LoginMethod, ProviderKind, ProviderStatus};

/// Continuation run once after a successful login.
pub type OnLogin = Box<dyn FnOnce(&AuthResult) + Send>;

pub struct LoginOptions {
    pub method: LoginMethod,
    pub status: Option<StatusSink>,
    pub on_success: Option<OnLogin>,
}

impl LoginOptions {
    pub fn new(method: LoginMethod) -> Self {
        Self {
            method,
            status: None,
            on_success: None,
        }
    }

    pub fn with_status(mut self, sink: StatusSink) -> Self {
        self.status = Some(sink);
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(&AuthResult) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn status(&self) -> ProviderStatus;

    /// Whether this backend can run on the current platform.
    fn is_available(&self) -> bool {
        true
    }

    /// Hook for backends that need setup before first use. Returns the
    /// session it restored, if any.
    async fn initialize(&self) -> Result<Option<AuthResult>, WalletError> {
        Ok(None)
    }

    /// Authenticate, connect a wallet and run `on_success` exactly once.
    async fn login(&self, options: LoginOptions) -> Result<AuthResult, WalletError>;

    /// Drop the session. Always ends `Disconnected`; backend failures are
    /// logged and returned after the transition.
    async fn logout(&self, status: Option<StatusSink>) -> Result<(), WalletError>;

    /// Connect (or return the already connected) wallet. `None` means the
    /// backend needs an out-of-band step first.
    async fn connect_wallet(
        &self,
        status: Option<StatusSink>,
    ) -> Result<Option<WalletAdapter>, WalletError>;

    fn current_wallet(&self) -> Option<WalletAdapter>;

    /// Sign and broadcast, returning the transaction signature.
    async fn sign_and_send_transaction(
        &self,
        tx: TransactionRequest,
        rpc: &dyn RpcEndpoint,
        options: SendOptions,
    ) -> Result<String, WalletError>;
}

// ─── Shared provider state ───────────────────────────────────────────

#[derive(Default)]
struct ProviderState {
    status: ProviderStatus,
    wallet: Option<WalletAdapter>,
}

/// Status and current wallet behind a short-lived lock.
///
/// Never held across an `.await`.
pub(crate) struct StateCell {
    kind: ProviderKind,
    inner: Mutex<ProviderState>,
}

impl StateCell {
    pub(crate) fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(ProviderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> ProviderStatus {
        self.lock().status
    }

    pub(crate) fn wallet(&self) -> Option<WalletAdapter> {
        self.lock().wallet.clone()
    }

    /// Move to `next` if the edge is legal. Returns whether it applied.
    pub(crate) fn transition(&self, next: ProviderStatus) -> bool {
        let mut state = self.lock();
        let current = state.status;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(provider = %self.kind, from = ?current, to = ?next, "illegal status transition ignored");
            return false;
        }
        tracing::debug!(provider = %self.kind, from = ?current, to = ?next, "provider status");
        state.status = next;
        true
    }

    /// Enter `Connecting` for a fresh attempt from any state. Callers other
    /// than login must refuse to run from `Error` first.
    pub(crate) fn begin_attempt(&self) {
        if self.status() == ProviderStatus::Connected {
            self.transition(ProviderStatus::Disconnected);
        }
        self.transition(ProviderStatus::Connecting);
    }

    /// Record a connected wallet and mark the provider `Connected`.
    pub(crate) fn connected(&self, wallet: WalletAdapter) {
        let mut state = self.lock();
        tracing::info!(provider = %self.kind, address = ?wallet.address(), "wallet connected");
        state.wallet = Some(wallet);
        state.status = ProviderStatus::Connected;
    }

    pub(crate) fn failed(&self) {
        self.transition(ProviderStatus::Error);
    }

    /// Forget the wallet and drop to `Disconnected`.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        if state.status != ProviderStatus::Disconnected {
            tracing::debug!(provider = %self.kind, from = ?state.status, "provider status reset");
        }
        state.wallet = None;
        state.status = ProviderStatus::Disconnected;
    }
}
