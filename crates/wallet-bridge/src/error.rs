use thiserror::Error;

use crate::types::ProviderKind;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authorization denied: {0}")]
    Authorization(String),

    #[error("Transaction decode failed: {0}")]
    TransactionDecode(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Transaction {signature} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { signature: String, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No provider registered for {0}")]
    ProviderNotRegistered(ProviderKind),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<chain_sol::SolError> for WalletError {
    fn from(e: chain_sol::SolError) -> Self {
        use chain_sol::SolError;
        match e {
            SolError::SigningError(msg) | SolError::InvalidPrivateKey(msg) => {
                WalletError::Signing(msg)
            }
            other => WalletError::TransactionDecode(other.to_string()),
        }
    }
}
