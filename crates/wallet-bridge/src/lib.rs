//! Wallet-provider abstraction and transaction pipeline.
//!
//! Applications register interchangeable wallet backends (an embedded
//! key-management service, an external wallet app, or their own) in a
//! [`ProviderRegistry`], log in through [`AuthOrchestrator`], and hand
//! transactions to the selected provider. The [`TransactionService`]
//! normalizes the encoding, routes signing through the backend's transport,
//! broadcasts and polls for confirmation.
//!
//! [`WalletBridge`] wires all of it from a [`BridgeConfig`].

pub mod adapter;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod embedded;
pub mod error;
pub mod external;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod rpc;
pub mod status;
pub mod transaction;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Capability, RequestTransport, SigningTransport, WalletAdapter, WalletTransport};
pub use auth::{AuthOrchestrator, SessionState, SessionStore};
pub use bridge::{BridgeBackends, WalletBridge};
pub use config::{load_config, BridgeConfig, ConfigError, SendConfig};
pub use embedded::{EmbeddedProvider, KeyManagementSdk, LocalKeyManager};
pub use error::WalletError;
pub use external::{
    Authorization, AuthorizedAccount, BroadcastMode, ExternalWalletProvider, ProtocolSession,
    ProtocolTransport, WalletProtocol,
};
pub use provider::{LoginOptions, OnLogin, WalletProvider};
pub use registry::{PlatformCapabilities, ProviderRegistry, StaticPlatform};
pub use rpc::{ConfirmationState, JsonRpcClient, RpcEndpoint};
pub use status::{scrub_status, StatusSink};
pub use transaction::{SendOptions, SigningPolicy, TransactionRequest, TransactionService};
pub use types::{AppIdentity, AuthResult, LoginMethod, ProfileHints, ProviderKind, ProviderStatus};
