//! Transaction normalization, signing dispatch, broadcast and confirmation.
//!
//! The service keeps no per-transaction state. The only thing it remembers is
//! one async lock per wallet, used when [`SigningPolicy::SingleFlightPerWallet`]
//! is configured.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chain_sol::{
    decode_transaction, EnvelopeVersion, LegacyTransaction, SolTransaction, VersionedTransaction,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::adapter::{Capability, WalletAdapter, WalletTransport};
use crate::error::WalletError;
use crate::rpc::{ConfirmationState, RpcEndpoint};
use crate::status::{StatusNarrator, StatusSink};
use crate::types::ProviderKind;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CONFIRM_DELAY: Duration = Duration::from_secs(2);

// ─── Requests ────────────────────────────────────────────────────────

/// A transaction handed to the pipeline, either decoded or as Base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRequest {
    RawObject(SolTransaction),
    Base64(String),
}

impl From<SolTransaction> for TransactionRequest {
    fn from(tx: SolTransaction) -> Self {
        TransactionRequest::RawObject(tx)
    }
}

impl From<LegacyTransaction> for TransactionRequest {
    fn from(tx: LegacyTransaction) -> Self {
        TransactionRequest::RawObject(SolTransaction::Legacy(tx))
    }
}

impl From<VersionedTransaction> for TransactionRequest {
    fn from(tx: VersionedTransaction) -> Self {
        TransactionRequest::RawObject(SolTransaction::Versioned(tx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEnvelope {
    Legacy,
    V0,
}

impl From<EnvelopeVersion> for WireEnvelope {
    fn from(v: EnvelopeVersion) -> Self {
        match v {
            EnvelopeVersion::Legacy => WireEnvelope::Legacy,
            EnvelopeVersion::V0 => WireEnvelope::V0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    pub envelope: WireEnvelope,
    /// Base64 of the full wire transaction.
    pub bytes: String,
}

/// JSON shape of a [`TransactionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireTransactionRequest {
    Transaction { transaction: WireTransaction },
    Base64 { data: String },
}

impl TryFrom<WireTransactionRequest> for TransactionRequest {
    type Error = WalletError;

    fn try_from(wire: WireTransactionRequest) -> Result<Self, Self::Error> {
        match wire {
            WireTransactionRequest::Base64 { data } => Ok(TransactionRequest::Base64(data)),
            WireTransactionRequest::Transaction { transaction } => {
                let bytes = BASE64
                    .decode(&transaction.bytes)
                    .map_err(|e| WalletError::TransactionDecode(format!("base64: {e}")))?;
                let tx = match transaction.envelope {
                    WireEnvelope::Legacy => {
                        SolTransaction::Legacy(LegacyTransaction::deserialize(&bytes)?)
                    }
                    WireEnvelope::V0 => {
                        SolTransaction::Versioned(VersionedTransaction::deserialize(&bytes)?)
                    }
                };
                Ok(TransactionRequest::RawObject(tx))
            }
        }
    }
}

impl TryFrom<&TransactionRequest> for WireTransactionRequest {
    type Error = WalletError;

    fn try_from(req: &TransactionRequest) -> Result<Self, Self::Error> {
        match req {
            TransactionRequest::Base64(data) => Ok(WireTransactionRequest::Base64 { data: data.clone() }),
            TransactionRequest::RawObject(tx) => Ok(WireTransactionRequest::Transaction {
                transaction: WireTransaction {
                    envelope: tx.envelope().into(),
                    bytes: BASE64.encode(tx.serialize()?),
                },
            }),
        }
    }
}

impl<'de> Deserialize<'de> for TransactionRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireTransactionRequest::deserialize(deserializer)?;
        TransactionRequest::try_from(wire).map_err(serde::de::Error::custom)
    }
}

impl Serialize for TransactionRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireTransactionRequest::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

// ─── Options and policy ──────────────────────────────────────────────

#[derive(Clone)]
pub struct SendOptions {
    pub confirm_after_send: bool,
    /// Confirmation checks before giving up. Values below 1 are treated as 1.
    pub max_retries: u32,
    pub status: Option<StatusSink>,
    pub cancel: Option<CancellationToken>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            confirm_after_send: true,
            max_retries: DEFAULT_MAX_RETRIES,
            status: None,
            cancel: None,
        }
    }
}

impl SendOptions {
    pub fn with_status(mut self, sink: StatusSink) -> Self {
        self.status = Some(sink);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn without_confirmation(mut self) -> Self {
        self.confirm_after_send = false;
        self
    }
}

/// Whether sends against the same wallet may overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningPolicy {
    #[default]
    #[serde(rename = "concurrent")]
    Concurrent,
    #[serde(rename = "single-flight")]
    SingleFlightPerWallet,
}

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F>(
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Result<F::Output, WalletError>
where
    F: Future,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(WalletError::Cancelled),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}

// ─── Service ─────────────────────────────────────────────────────────

pub struct TransactionService {
    policy: SigningPolicy,
    confirm_delay: Duration,
    wallet_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for TransactionService {
    fn default() -> Self {
        Self::new(SigningPolicy::default(), DEFAULT_CONFIRM_DELAY)
    }
}

impl TransactionService {
    pub fn new(policy: SigningPolicy, confirm_delay: Duration) -> Self {
        Self {
            policy,
            confirm_delay,
            wallet_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SigningPolicy {
        self.policy
    }

    /// Decode a request into a transaction, versioned envelope first.
    pub fn normalize(&self, request: TransactionRequest) -> Result<SolTransaction, WalletError> {
        let tx = match request {
            TransactionRequest::RawObject(tx) => {
                tx.validate()?;
                tx
            }
            TransactionRequest::Base64(encoded) => {
                let bytes = BASE64
                    .decode(encoded.trim())
                    .map_err(|e| WalletError::TransactionDecode(format!("base64: {e}")))?;
                decode_transaction(&bytes)?
            }
        };
        let signers = tx.signer_keys()?.len();
        tracing::debug!(envelope = ?tx.envelope(), signers, "transaction normalized");
        Ok(tx)
    }

    /// Sign through the adapter's transport, broadcast, and optionally wait
    /// for confirmation. Returns the Base58 signature.
    pub async fn sign_and_send(
        &self,
        adapter: &WalletAdapter,
        request: TransactionRequest,
        rpc: &dyn RpcEndpoint,
        options: &SendOptions,
    ) -> Result<String, WalletError> {
        let narrator = StatusNarrator::for_transactions(options.status.clone());
        let result = self.run(adapter, request, rpc, options, &narrator).await;
        if let Err(err) = &result {
            narrator.fail(err);
        }
        result
    }

    async fn run(
        &self,
        adapter: &WalletAdapter,
        request: TransactionRequest,
        rpc: &dyn RpcEndpoint,
        options: &SendOptions,
        narrator: &StatusNarrator,
    ) -> Result<String, WalletError> {
        let cancel = options.cancel.as_ref();

        narrator.emit("Preparing transaction...");
        let tx = self.normalize(request)?;

        let _guard = match self.policy {
            SigningPolicy::Concurrent => None,
            SigningPolicy::SingleFlightPerWallet => {
                let lock = self.wallet_lock(adapter);
                Some(cancellable(cancel, lock.lock_owned()).await?)
            }
        };

        let signature = match (adapter.kind(), adapter.transport()) {
            (_, WalletTransport::Protocol(transport)) => {
                transport.sign_and_send(tx, rpc, cancel, narrator).await?
            }
            (ProviderKind::ExternalProtocol, WalletTransport::Capability(_)) => {
                return Err(WalletError::Connection(
                    "external wallet adapter has no protocol transport".into(),
                ));
            }
            (_, WalletTransport::Capability(capability)) => {
                self.send_via_capability(capability, tx, rpc, cancel, narrator)
                    .await?
            }
        };
        tracing::info!(%signature, provider = %adapter.kind(), "transaction broadcast");

        if options.confirm_after_send {
            narrator.emit("Confirming transaction...");
            self.confirm(rpc, &signature, options.max_retries.max(1), cancel)
                .await?;
            narrator.emit("Transaction confirmed");
        } else {
            narrator.emit("Transaction sent");
        }

        Ok(signature)
    }

    async fn send_via_capability(
        &self,
        capability: &Capability,
        tx: SolTransaction,
        rpc: &dyn RpcEndpoint,
        cancel: Option<&CancellationToken>,
        narrator: &StatusNarrator,
    ) -> Result<String, WalletError> {
        match capability {
            Capability::UniformRequest(transport) => {
                let params = json!({
                    "transaction": BASE64.encode(tx.serialize()?),
                    "encoding": "base64",
                    "envelope": WireEnvelope::from(tx.envelope()),
                });
                narrator.emit("Waiting for wallet approval...");
                let response =
                    cancellable(cancel, transport.request("signAndSendTransaction", params))
                        .await??;
                signature_from_response(&response)
            }
            Capability::SignThenBroadcast(transport) => {
                narrator.emit("Signing transaction...");
                let signed = cancellable(cancel, transport.sign_transaction(tx)).await??;
                let signature = signed.signature_string().ok_or_else(|| {
                    WalletError::Signing("transport returned an unsigned transaction".into())
                })?;

                narrator.emit("Sending transaction...");
                let wire = signed.serialize()?;
                let reported = cancellable(cancel, rpc.send_raw_transaction(&wire)).await??;
                if reported != signature {
                    tracing::warn!(%signature, %reported, "node reported a different signature");
                }
                Ok(signature)
            }
        }
    }

    /// Poll until confirmed, failed on chain, or `max_retries` checks ran.
    async fn confirm(
        &self,
        rpc: &dyn RpcEndpoint,
        signature: &str,
        max_retries: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), WalletError> {
        for attempt in 1..=max_retries {
            match cancellable(cancel, rpc.confirm_transaction(signature)).await? {
                Ok(ConfirmationState::Confirmed) => {
                    tracing::info!(%signature, attempt, "transaction confirmed");
                    return Ok(());
                }
                Ok(ConfirmationState::Failed(detail)) => {
                    tracing::error!(%signature, %detail, "transaction failed on chain");
                    return Err(WalletError::Broadcast(format!(
                        "transaction {signature} failed on chain: {detail}"
                    )));
                }
                Ok(ConfirmationState::Pending) => {
                    tracing::debug!(%signature, attempt, max_retries, "not confirmed yet");
                }
                Err(e) => {
                    tracing::warn!(%signature, attempt, error = %e, "confirmation check failed");
                }
            }

            if attempt < max_retries {
                cancellable(cancel, tokio::time::sleep(self.confirm_delay)).await?;
            }
        }

        Err(WalletError::ConfirmationTimeout {
            signature: signature.to_string(),
            attempts: max_retries,
        })
    }

    fn wallet_lock(&self, adapter: &WalletAdapter) -> Arc<tokio::sync::Mutex<()>> {
        let key = match adapter.address() {
            Some(address) => address.to_string(),
            None => adapter.kind().to_string(),
        };
        let mut locks = self
            .wallet_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map holds an idle lock; nobody can be waiting on it.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key).or_default())
    }

    #[cfg(test)]
    fn tracked_wallets(&self) -> usize {
        self.wallet_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Accept either a bare signature string or `{ "signature": "..." }`.
fn signature_from_response(response: &Value) -> Result<String, WalletError> {
    response
        .as_str()
        .or_else(|| response.get("signature").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| WalletError::Signing(format!("wallet response has no signature: {response}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        adapter_with, recording_sink, transfer_tx, FakeRpc, KeySigner, RecordingTransport,
    };
    use std::sync::atomic::Ordering;

    fn service() -> TransactionService {
        TransactionService::new(SigningPolicy::Concurrent, Duration::from_millis(1))
    }

    #[test]
    fn base64_legacy_roundtrip_is_byte_identical() {
        let tx = transfer_tx(&KeySigner::new(1).pubkey());
        let wire = tx.serialize().unwrap();

        let normalized = service()
            .normalize(TransactionRequest::Base64(BASE64.encode(&wire)))
            .unwrap();

        assert_eq!(normalized.envelope(), EnvelopeVersion::Legacy);
        assert_eq!(normalized.serialize().unwrap(), wire);
    }

    #[test]
    fn legacy_bytes_fall_back_from_versioned() {
        let tx = transfer_tx(&KeySigner::new(1).pubkey());
        let wire = tx.serialize().unwrap();
        assert!(VersionedTransaction::deserialize(&wire).is_err());

        let normalized = service()
            .normalize(TransactionRequest::Base64(BASE64.encode(&wire)))
            .unwrap();
        assert_eq!(normalized, SolTransaction::Legacy(tx));
    }

    #[test]
    fn garbage_is_decode_error() {
        let err = service()
            .normalize(TransactionRequest::Base64(BASE64.encode([1u8, 2, 3])))
            .unwrap_err();
        assert!(matches!(err, WalletError::TransactionDecode(_)));

        let err = service()
            .normalize(TransactionRequest::Base64("%%%".into()))
            .unwrap_err();
        assert!(matches!(err, WalletError::TransactionDecode(_)));
    }

    #[test]
    fn wire_request_shapes() {
        let tx = transfer_tx(&KeySigner::new(1).pubkey());
        let request = TransactionRequest::from(tx.clone());

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["type"], "transaction");
        assert_eq!(encoded["transaction"]["envelope"], "legacy");

        let decoded: TransactionRequest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);

        let b64: TransactionRequest =
            serde_json::from_value(json!({ "type": "base64", "data": "AQID" })).unwrap();
        assert_eq!(b64, TransactionRequest::Base64("AQID".into()));
    }

    #[test]
    fn wire_request_with_wrong_envelope_fails() {
        let tx = transfer_tx(&KeySigner::new(1).pubkey());
        let raw = json!({
            "type": "transaction",
            "transaction": { "envelope": "v0", "bytes": BASE64.encode(tx.serialize().unwrap()) }
        });
        assert!(serde_json::from_value::<TransactionRequest>(raw).is_err());
    }

    #[test]
    fn policy_names() {
        let policy: SigningPolicy = serde_json::from_str("\"single-flight\"").unwrap();
        assert_eq!(policy, SigningPolicy::SingleFlightPerWallet);
        assert_eq!(SigningPolicy::default(), SigningPolicy::Concurrent);
    }

    #[test]
    fn response_signature_forms() {
        assert_eq!(signature_from_response(&json!("abc")).unwrap(), "abc");
        assert_eq!(signature_from_response(&json!({ "signature": "def" })).unwrap(), "def");
        assert!(matches!(
            signature_from_response(&json!({ "ok": true })),
            Err(WalletError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn always_pending_checks_exactly_max_retries() {
        let signer = KeySigner::new(2);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let rpc = FakeRpc::new();

        let err = service()
            .sign_and_send(&adapter, transfer_tx(&signer.pubkey()).into(), &rpc, &SendOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::ConfirmationTimeout { attempts: 3, .. }));
        assert_eq!(rpc.confirm_calls(), 3);
        assert_eq!(rpc.sent().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_on_second_check_stops_polling() {
        let signer = KeySigner::new(2);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let rpc = FakeRpc::new().script([
            Ok(ConfirmationState::Pending),
            Ok(ConfirmationState::Confirmed),
        ]);
        let (sink, lines) = recording_sink();

        let signature = service()
            .sign_and_send(
                &adapter,
                transfer_tx(&signer.pubkey()).into(),
                &rpc,
                &SendOptions::default().with_status(sink),
            )
            .await
            .unwrap();

        assert_eq!(rpc.confirm_calls(), 2);
        let sent = decode_transaction(&rpc.sent()[0]).unwrap();
        assert_eq!(sent.signature_string().as_deref(), Some(signature.as_str()));
        assert_eq!(lines.lock().unwrap().last().map(String::as_str), Some("Transaction confirmed"));
    }

    #[tokio::test]
    async fn failed_check_counts_as_attempt() {
        let signer = KeySigner::new(2);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let rpc = FakeRpc::new().script([
            Err(WalletError::Rpc("timeout".into())),
            Ok(ConfirmationState::Confirmed),
        ]);

        service()
            .sign_and_send(&adapter, transfer_tx(&signer.pubkey()).into(), &rpc, &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(rpc.confirm_calls(), 2);
    }

    #[tokio::test]
    async fn on_chain_failure_stops_and_scrubs_status() {
        let signer = KeySigner::new(2);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let rpc = FakeRpc::new().script([Ok(ConfirmationState::Failed(
            "insufficient funds".into(),
        ))]);
        let (sink, lines) = recording_sink();

        let err = service()
            .sign_and_send(
                &adapter,
                transfer_tx(&signer.pubkey()).into(),
                &rpc,
                &SendOptions::default().with_status(sink),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::Broadcast(_)));
        assert!(err.to_string().contains("insufficient funds"));
        assert_eq!(rpc.confirm_calls(), 1);
        let lines = lines.lock().unwrap();
        assert_eq!(lines.last().map(String::as_str), Some("Transaction failed"));
        assert!(lines.iter().all(|l| !l.contains("insufficient funds")));
    }

    #[tokio::test]
    async fn skip_confirmation_reports_sent() {
        let signer = KeySigner::new(4);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let rpc = FakeRpc::new();
        let (sink, lines) = recording_sink();

        service()
            .sign_and_send(
                &adapter,
                transfer_tx(&signer.pubkey()).into(),
                &rpc,
                &SendOptions::default().without_confirmation().with_status(sink),
            )
            .await
            .unwrap();

        assert_eq!(rpc.confirm_calls(), 0);
        assert_eq!(lines.lock().unwrap().last().map(String::as_str), Some("Transaction sent"));
    }

    #[tokio::test]
    async fn uniform_request_makes_one_call_and_no_broadcast() {
        let signer = KeySigner::new(5);
        let transport = Arc::new(RecordingTransport::returning(json!({ "signature": "sig123" })));
        let adapter = adapter_with(Capability::UniformRequest(transport.clone()), &signer);
        let rpc = FakeRpc::new();

        let signature = service()
            .sign_and_send(
                &adapter,
                transfer_tx(&signer.pubkey()).into(),
                &rpc,
                &SendOptions::default().without_confirmation(),
            )
            .await
            .unwrap();

        assert_eq!(signature, "sig123");
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "signAndSendTransaction");
        assert_eq!(calls[0].1["encoding"], "base64");
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn decode_failure_never_reaches_transport() {
        let signer = KeySigner::new(5);
        let transport = Arc::new(RecordingTransport::returning(json!("sig")));
        let adapter = adapter_with(Capability::UniformRequest(transport.clone()), &signer);

        let err = service()
            .sign_and_send(
                &adapter,
                TransactionRequest::Base64("AAAA".into()),
                &FakeRpc::new(),
                &SendOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::TransactionDecode(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn inconsistent_raw_object_is_decode_error() {
        let signer = KeySigner::new(5);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let mut tx = transfer_tx(&signer.pubkey());
        tx.message.header.num_required_signatures = 9;
        let rpc = FakeRpc::new();

        let err = service()
            .sign_and_send(&adapter, TransactionRequest::from(tx), &rpc, &SendOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::TransactionDecode(_)));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn wrong_signer_is_signing_error() {
        let signer = KeySigner::new(6);
        let other = KeySigner::new(7);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);

        let err = service()
            .sign_and_send(&adapter, transfer_tx(&other.pubkey()).into(), &FakeRpc::new(), &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Signing(_)));
    }

    async fn max_overlap(policy: SigningPolicy) -> usize {
        let signer = KeySigner::new(8).with_delay(Duration::from_millis(20));
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let service = TransactionService::new(policy, Duration::from_millis(1));
        let rpc = FakeRpc::new();
        let options = SendOptions::default().without_confirmation();

        let (a, b) = tokio::join!(
            service.sign_and_send(&adapter, transfer_tx(&signer.pubkey()).into(), &rpc, &options),
            service.sign_and_send(&adapter, transfer_tx(&signer.pubkey()).into(), &rpc, &options),
        );
        a.unwrap();
        b.unwrap();
        signer.max_in_flight.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn single_flight_serializes_same_wallet() {
        assert_eq!(max_overlap(SigningPolicy::SingleFlightPerWallet).await, 1);
    }

    #[tokio::test]
    async fn idle_wallet_locks_are_dropped() {
        let service = TransactionService::new(SigningPolicy::SingleFlightPerWallet, Duration::from_millis(1));
        let rpc = FakeRpc::new();
        let options = SendOptions::default().without_confirmation();

        for n in 20..25u8 {
            let signer = KeySigner::new(n);
            let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
            service
                .sign_and_send(&adapter, transfer_tx(&signer.pubkey()).into(), &rpc, &options)
                .await
                .unwrap();
        }

        assert_eq!(service.tracked_wallets(), 1);
        assert_eq!(rpc.sent().len(), 5);
    }

    #[tokio::test]
    async fn concurrent_policy_allows_overlap() {
        assert_eq!(max_overlap(SigningPolicy::Concurrent).await, 2);
    }

    #[tokio::test]
    async fn cancelled_token_stops_confirmation() {
        let signer = KeySigner::new(9);
        let adapter = adapter_with(Capability::SignThenBroadcast(Arc::new(signer.clone())), &signer);
        let rpc = FakeRpc::new();
        let token = CancellationToken::new();
        let service = TransactionService::new(SigningPolicy::Concurrent, Duration::from_secs(60));

        let canceller = {
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            }
        };
        let options = SendOptions::default().with_cancel(token);
        let (result, ()) = tokio::join!(
            service.sign_and_send(&adapter, transfer_tx(&signer.pubkey()).into(), &rpc, &options),
            canceller,
        );

        assert!(matches!(result, Err(WalletError::Cancelled)));
        assert_eq!(rpc.confirm_calls(), 1);
    }
}
