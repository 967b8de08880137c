use thiserror::Error;

/// Solana wire-format and address errors.
#[derive(Debug, Error)]
pub enum SolError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("unsupported message version: {0}")]
    UnsupportedVersion(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_address() {
        let err = SolError::InvalidAddress("bad decode".into());
        assert_eq!(err.to_string(), "invalid address: bad decode");
    }

    #[test]
    fn display_deserialization_error() {
        let err = SolError::DeserializationError("trailing bytes".into());
        assert_eq!(err.to_string(), "deserialization error: trailing bytes");
    }

    #[test]
    fn display_unsupported_version() {
        let err = SolError::UnsupportedVersion(3);
        assert_eq!(err.to_string(), "unsupported message version: 3");
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> =
            Box::new(SolError::SigningError("wallet pubkey not found".into()));
        assert!(err.to_string().contains("wallet pubkey"));
    }
}
