//! Backend-agnostic description of a connected wallet.

use std::sync::Arc;

use async_trait::async_trait;
use chain_sol::{Pubkey, SolTransaction};
use serde::Serialize;
use serde_json::Value;

use crate::error::WalletError;
use crate::external::ProtocolTransport;
use crate::types::ProviderKind;

/// A transport that accepts named requests and does the whole job itself.
#[async_trait]
pub trait RequestTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;
}

/// A transport that only signs; the caller broadcasts.
#[async_trait]
pub trait SigningTransport: Send + Sync {
    /// Sign in place and return the signed transaction.
    async fn sign_transaction(&self, tx: SolTransaction) -> Result<SolTransaction, WalletError>;
}

/// How a backend accepts sign requests. Fixed when the backend is built.
#[derive(Clone)]
pub enum Capability {
    UniformRequest(Arc<dyn RequestTransport>),
    SignThenBroadcast(Arc<dyn SigningTransport>),
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::UniformRequest(_) => "uniform-request",
            Capability::SignThenBroadcast(_) => "sign-then-broadcast",
        }
    }
}

/// Provider-specific handle used by the transaction service.
#[derive(Clone)]
pub enum WalletTransport {
    Capability(Capability),
    Protocol(Arc<ProtocolTransport>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterDescription {
    pub kind: ProviderKind,
    pub address: Option<String>,
}

/// A connected (or not yet connected) wallet.
///
/// Address and public key live in one optional pair so they are set and
/// cleared together.
#[derive(Clone)]
pub struct WalletAdapter {
    kind: ProviderKind,
    account: Option<(String, Pubkey)>,
    raw_handle: Value,
    transport: WalletTransport,
}

impl WalletAdapter {
    pub fn new(kind: ProviderKind, transport: WalletTransport) -> Self {
        Self {
            kind,
            account: None,
            raw_handle: Value::Null,
            transport,
        }
    }

    pub fn with_account(mut self, address: impl Into<String>, key: Pubkey) -> Self {
        self.account = Some((address.into(), key));
        self
    }

    pub fn with_raw_handle(mut self, raw: Value) -> Self {
        self.raw_handle = raw;
        self
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn address(&self) -> Option<&str> {
        self.account.as_ref().map(|(addr, _)| addr.as_str())
    }

    pub fn public_key(&self) -> Option<Pubkey> {
        self.account.as_ref().map(|(_, key)| *key)
    }

    pub fn raw_handle(&self) -> &Value {
        &self.raw_handle
    }

    pub fn describe(&self) -> AdapterDescription {
        AdapterDescription {
            kind: self.kind.clone(),
            address: self.address().map(str::to_string),
        }
    }

    pub fn transport(&self) -> &WalletTransport {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }
}

impl std::fmt::Debug for WalletAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transport = match &self.transport {
            WalletTransport::Capability(c) => c.name(),
            WalletTransport::Protocol(_) => "protocol",
        };
        f.debug_struct("WalletAdapter")
            .field("kind", &self.kind)
            .field("address", &self.address())
            .field("transport", &transport)
            .finish()
    }
}
