//! Fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chain_sol::{
    build_sol_transfer, compile_message, decode_transaction, LegacyTransaction, Pubkey,
    SolAccountMeta, SolInstruction, SolTransaction,
};
use secrecy::SecretString;
use serde_json::{json, Value};

use crate::adapter::{Capability, RequestTransport, SigningTransport, WalletAdapter, WalletTransport};
use crate::embedded::{EmbeddedWalletHandle, EmbeddedWalletState, KeyManagementSdk, SdkUser};
use crate::error::WalletError;
use crate::external::{Authorization, AuthorizedAccount, ProtocolSession, WalletProtocol};
use crate::provider::{LoginOptions, WalletProvider};
use crate::rpc::{ConfirmationState, RpcEndpoint};
use crate::status::StatusSink;
use crate::transaction::{SendOptions, TransactionRequest};
use crate::types::{AppIdentity, AuthResult, ProfileHints, ProviderKind, ProviderStatus};

pub fn recording_sink() -> (StatusSink, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&lines);
    let sink: StatusSink = Arc::new(move |s: &str| captured.lock().unwrap().push(s.to_string()));
    (sink, lines)
}

/// Signed-ready transfer from `payer` with a real-looking blockhash.
pub fn transfer_tx(payer: &Pubkey) -> LegacyTransaction {
    let msg = build_sol_transfer(payer.as_bytes(), &[9u8; 32], 1_000, &[4u8; 32]).unwrap();
    LegacyTransaction::new_unsigned(msg)
}

/// A draft with neither fee payer nor blockhash.
pub fn draft_transfer() -> LegacyTransaction {
    let ix = SolInstruction {
        program_id: [7u8; 32],
        accounts: vec![SolAccountMeta {
            pubkey: [8u8; 32],
            is_signer: false,
            is_writable: true,
        }],
        data: vec![1, 2, 3],
    };
    LegacyTransaction::new_unsigned(compile_message(&[ix], None, &[0u8; 32]).unwrap())
}

pub fn adapter_with(capability: Capability, signer: &KeySigner) -> WalletAdapter {
    let key = signer.pubkey();
    WalletAdapter::new(ProviderKind::Custom("test".into()), WalletTransport::Capability(capability))
        .with_account(key.to_address(), key)
}

// ─── Transports ──────────────────────────────────────────────────────

pub struct EchoTransport;

#[async_trait]
impl RequestTransport for EchoTransport {
    async fn request(&self, _method: &str, params: Value) -> Result<Value, WalletError> {
        Ok(params)
    }
}

pub struct RecordingTransport {
    response: Value,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    pub fn returning(response: Value) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestTransport for RecordingTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        Ok(self.response.clone())
    }
}

/// Signs with a fixed seed and tracks overlapping calls.
#[derive(Clone)]
pub struct KeySigner {
    seed: [u8; 32],
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl KeySigner {
    pub fn new(n: u8) -> Self {
        Self {
            seed: [n; 32],
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new(
            ed25519_dalek::SigningKey::from_bytes(&self.seed)
                .verifying_key()
                .to_bytes(),
        )
    }

    fn sign(&self, mut tx: SolTransaction) -> Result<SolTransaction, WalletError> {
        tx.sign_with(&self.seed)?;
        Ok(tx)
    }
}

#[async_trait]
impl SigningTransport for KeySigner {
    async fn sign_transaction(&self, tx: SolTransaction) -> Result<SolTransaction, WalletError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.sign(tx);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ─── RPC ─────────────────────────────────────────────────────────────

pub struct FakeRpc {
    blockhash: [u8; 32],
    script: Mutex<VecDeque<Result<ConfirmationState, WalletError>>>,
    confirm_calls: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl FakeRpc {
    /// Every confirmation check reports `Pending` unless scripted.
    pub fn new() -> Self {
        Self {
            blockhash: [0x42; 32],
            script: Mutex::new(VecDeque::new()),
            confirm_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn script(
        self,
        steps: impl IntoIterator<Item = Result<ConfirmationState, WalletError>>,
    ) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn blockhash(&self) -> [u8; 32] {
        self.blockhash
    }
}

#[async_trait]
impl RpcEndpoint for FakeRpc {
    async fn latest_blockhash(&self) -> Result<[u8; 32], WalletError> {
        Ok(self.blockhash)
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String, WalletError> {
        let signature = decode_transaction(wire)?
            .signature_string()
            .ok_or_else(|| WalletError::Broadcast("unsigned transaction".into()))?;
        self.sent.lock().unwrap().push(wire.to_vec());
        Ok(signature)
    }

    async fn confirm_transaction(&self, _signature: &str) -> Result<ConfirmationState, WalletError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ConfirmationState::Pending))
    }
}

// ─── External wallet protocol ────────────────────────────────────────

#[derive(Default)]
struct ProtocolCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    deauthorized: AtomicUsize,
    wallet_sent: AtomicUsize,
    last_identity: Mutex<Option<AppIdentity>>,
}

#[derive(Clone)]
pub struct FakeProtocol {
    signer: KeySigner,
    accounts: Vec<String>,
    sign_delay: Duration,
    fail_sign: bool,
    fail_deauthorize: bool,
    counters: Arc<ProtocolCounters>,
}

impl FakeProtocol {
    pub fn new(signer: KeySigner) -> Self {
        Self {
            accounts: vec![signer.pubkey().to_address()],
            signer,
            sign_delay: Duration::ZERO,
            fail_sign: false,
            fail_deauthorize: false,
            counters: Arc::new(ProtocolCounters::default()),
        }
    }

    pub fn with_accounts(mut self, accounts: Vec<String>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = delay;
        self
    }

    pub fn failing_sign(mut self) -> Self {
        self.fail_sign = true;
        self
    }

    pub fn failing_deauthorize(mut self) -> Self {
        self.fail_deauthorize = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn deauthorized(&self) -> usize {
        self.counters.deauthorized.load(Ordering::SeqCst)
    }

    pub fn wallet_sent(&self) -> usize {
        self.counters.wallet_sent.load(Ordering::SeqCst)
    }

    pub fn last_identity(&self) -> Option<AppIdentity> {
        self.counters.last_identity.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProtocol for FakeProtocol {
    async fn open_session(&self) -> Result<Box<dyn ProtocolSession>, WalletError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            protocol: self.clone(),
        }))
    }
}

struct FakeSession {
    protocol: FakeProtocol,
}

impl FakeSession {
    async fn sign_all(&self, txs: Vec<SolTransaction>) -> Result<Vec<SolTransaction>, WalletError> {
        if !self.protocol.sign_delay.is_zero() {
            tokio::time::sleep(self.protocol.sign_delay).await;
        }
        if self.protocol.fail_sign {
            return Err(WalletError::Signing("user declined".into()));
        }
        txs.into_iter().map(|tx| self.protocol.signer.sign(tx)).collect()
    }
}

#[async_trait]
impl ProtocolSession for FakeSession {
    async fn authorize(
        &mut self,
        identity: &AppIdentity,
        _cluster: &str,
        _auth_token: Option<&str>,
    ) -> Result<Authorization, WalletError> {
        *self.protocol.counters.last_identity.lock().unwrap() = Some(identity.clone());
        Ok(Authorization {
            accounts: self
                .protocol
                .accounts
                .iter()
                .map(|address| AuthorizedAccount {
                    address: address.clone(),
                    label: Some("Main".into()),
                })
                .collect(),
            auth_token: Some("token-1".into()),
        })
    }

    async fn sign_transactions(
        &mut self,
        txs: Vec<SolTransaction>,
    ) -> Result<Vec<SolTransaction>, WalletError> {
        self.sign_all(txs).await
    }

    async fn sign_and_send_transactions(
        &mut self,
        txs: Vec<SolTransaction>,
    ) -> Result<Vec<[u8; 64]>, WalletError> {
        let signed = self.sign_all(txs).await?;
        self.protocol.counters.wallet_sent.fetch_add(signed.len(), Ordering::SeqCst);
        Ok(signed
            .iter()
            .filter_map(|tx| tx.first_signature().copied())
            .collect())
    }

    async fn deauthorize(&mut self, _auth_token: &str) -> Result<(), WalletError> {
        if self.protocol.fail_deauthorize {
            return Err(WalletError::Connection("wallet app went away".into()));
        }
        self.protocol.counters.deauthorized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.protocol.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ─── Embedded SDK ────────────────────────────────────────────────────

pub struct FakeSdk {
    signer: KeySigner,
    state: Mutex<EmbeddedWalletState>,
    restorable: bool,
    fail_logout: bool,
    create_calls: AtomicUsize,
    state_calls: AtomicUsize,
}

impl FakeSdk {
    pub fn new(signer: KeySigner, state: EmbeddedWalletState) -> Self {
        Self {
            signer,
            state: Mutex::new(state),
            restorable: false,
            fail_logout: false,
            create_calls: AtomicUsize::new(0),
            state_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_restorable_session(mut self) -> Self {
        self.restorable = true;
        self
    }

    pub fn failing_logout(mut self) -> Self {
        self.fail_logout = true;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    fn user(&self) -> SdkUser {
        SdkUser {
            id: "user-1".into(),
            display_name: Some("Test User".into()),
            avatar_url: Some("https://example.com/a.png".into()),
        }
    }

    fn handle(&self) -> EmbeddedWalletHandle {
        EmbeddedWalletHandle {
            address: self.signer.pubkey().to_address(),
            raw: json!({ "walletId": "w-1" }),
        }
    }
}

#[async_trait]
impl KeyManagementSdk for FakeSdk {
    async fn restore_session(&self) -> Result<Option<SdkUser>, WalletError> {
        Ok(self.restorable.then(|| self.user()))
    }

    async fn login_with_oauth(&self, _provider: &str) -> Result<SdkUser, WalletError> {
        Ok(self.user())
    }

    async fn login_with_credential(
        &self,
        _identifier: &str,
        _secret: &SecretString,
    ) -> Result<SdkUser, WalletError> {
        Ok(self.user())
    }

    async fn wallet_state(&self) -> Result<EmbeddedWalletState, WalletError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().clone())
    }

    async fn create_wallet(&self) -> Result<EmbeddedWalletHandle, WalletError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let handle = self.handle();
        *self.state.lock().unwrap() = EmbeddedWalletState::Ready(handle.clone());
        Ok(handle)
    }

    async fn logout(&self) -> Result<(), WalletError> {
        if self.fail_logout {
            Err(WalletError::Connection("sdk unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn capability(&self) -> Capability {
        Capability::SignThenBroadcast(Arc::new(self.signer.clone()))
    }
}

// ─── Provider ────────────────────────────────────────────────────────

/// Minimal provider whose wallet is always present.
pub struct StubProvider {
    kind: ProviderKind,
    tag: String,
    available: bool,
    fail_login: bool,
    fail_logout: bool,
    status: Mutex<ProviderStatus>,
}

impl StubProvider {
    pub fn new(kind: ProviderKind, tag: &str) -> Self {
        Self {
            kind,
            tag: tag.to_string(),
            available: true,
            fail_login: false,
            fail_logout: false,
            status: Mutex::new(ProviderStatus::Disconnected),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    pub fn failing_logout(mut self) -> Self {
        self.fail_logout = true;
        self
    }

    pub fn connected(self) -> Self {
        *self.status.lock().unwrap() = ProviderStatus::Connected;
        self
    }

    fn wallet(&self) -> WalletAdapter {
        WalletAdapter::new(
            self.kind.clone(),
            WalletTransport::Capability(Capability::UniformRequest(Arc::new(EchoTransport))),
        )
        .with_raw_handle(json!({ "tag": self.tag }))
    }
}

#[async_trait]
impl WalletProvider for StubProvider {
    fn kind(&self) -> ProviderKind {
        self.kind.clone()
    }

    fn status(&self) -> ProviderStatus {
        *self.status.lock().unwrap()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn login(&self, options: LoginOptions) -> Result<AuthResult, WalletError> {
        if self.fail_login {
            *self.status.lock().unwrap() = ProviderStatus::Error;
            return Err(WalletError::Authorization("declined".into()));
        }
        let result = AuthResult {
            provider_kind: self.kind.clone(),
            address: format!("stub-{}", self.tag),
            profile: ProfileHints::default(),
        };
        *self.status.lock().unwrap() = ProviderStatus::Connected;
        if let Some(on_success) = options.on_success {
            on_success(&result);
        }
        Ok(result)
    }

    async fn logout(&self, _status: Option<StatusSink>) -> Result<(), WalletError> {
        *self.status.lock().unwrap() = ProviderStatus::Disconnected;
        if self.fail_logout {
            return Err(WalletError::Connection("backend unreachable".into()));
        }
        Ok(())
    }

    async fn connect_wallet(
        &self,
        _status: Option<StatusSink>,
    ) -> Result<Option<WalletAdapter>, WalletError> {
        Ok(Some(self.wallet()))
    }

    fn current_wallet(&self) -> Option<WalletAdapter> {
        Some(self.wallet())
    }

    async fn sign_and_send_transaction(
        &self,
        _tx: TransactionRequest,
        _rpc: &dyn RpcEndpoint,
        _options: SendOptions,
    ) -> Result<String, WalletError> {
        Err(WalletError::Signing("stub provider cannot sign".into()))
    }
}
