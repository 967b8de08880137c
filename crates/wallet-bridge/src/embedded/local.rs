//! In-process key manager for development and tests.
//!
//! Holds one Ed25519 seed in memory and signs locally. It speaks the same
//! [`KeyManagementSdk`] contract as a hosted service, so the rest of the
//! bridge cannot tell the difference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chain_sol::{Pubkey, SolTransaction};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{EmbeddedWalletHandle, EmbeddedWalletState, KeyManagementSdk, SdkUser};
use crate::adapter::{Capability, SigningTransport};
use crate::error::WalletError;

/// A 32-byte Ed25519 seed that is wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct LocalSeed([u8; 32]);

impl LocalSeed {
    fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self(seed)
    }

    fn pubkey(&self) -> Pubkey {
        Pubkey::new(SigningKey::from_bytes(&self.0).verifying_key().to_bytes())
    }
}

struct LocalSigner {
    seed: LocalSeed,
}

#[async_trait]
impl SigningTransport for LocalSigner {
    async fn sign_transaction(&self, mut tx: SolTransaction) -> Result<SolTransaction, WalletError> {
        tx.sign_with(&self.seed.0)?;
        Ok(tx)
    }
}

pub struct LocalKeyManager {
    signer: Arc<LocalSigner>,
    pubkey: Pubkey,
    wallet_created: AtomicBool,
    session: Mutex<Option<SdkUser>>,
    persisted: Mutex<Option<SdkUser>>,
}

impl LocalKeyManager {
    /// Fresh random key. The wallet counts as not yet created.
    pub fn generate() -> Self {
        Self::with_seed(LocalSeed::generate())
    }

    /// Deterministic key, mainly for tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::with_seed(LocalSeed(seed))
    }

    fn with_seed(seed: LocalSeed) -> Self {
        let pubkey = seed.pubkey();
        Self {
            signer: Arc::new(LocalSigner { seed }),
            pubkey,
            wallet_created: AtomicBool::new(false),
            session: Mutex::new(None),
            persisted: Mutex::new(None),
        }
    }

    /// Pretend a previous run left a signed-in session and a wallet behind.
    pub fn with_persisted_session(self, user_id: impl Into<String>) -> Self {
        *self.persisted.lock().unwrap_or_else(PoisonError::into_inner) = Some(SdkUser {
            id: user_id.into(),
            display_name: None,
            avatar_url: None,
        });
        self.wallet_created.store(true, Ordering::SeqCst);
        self
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    fn start_session(&self, user: SdkUser) -> SdkUser {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        *self.persisted.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        user
    }

    fn has_session(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn handle(&self) -> EmbeddedWalletHandle {
        EmbeddedWalletHandle {
            address: self.pubkey.to_address(),
            raw: json!({ "backend": "local", "publicKey": self.pubkey.to_address() }),
        }
    }
}

#[async_trait]
impl KeyManagementSdk for LocalKeyManager {
    async fn restore_session(&self) -> Result<Option<SdkUser>, WalletError> {
        let persisted = self
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(persisted.map(|user| self.start_session(user)))
    }

    async fn login_with_oauth(&self, provider: &str) -> Result<SdkUser, WalletError> {
        if provider.is_empty() {
            return Err(WalletError::Authorization("oauth provider is required".into()));
        }
        Ok(self.start_session(SdkUser {
            id: format!("{provider}:{}", self.pubkey),
            display_name: None,
            avatar_url: None,
        }))
    }

    async fn login_with_credential(
        &self,
        identifier: &str,
        secret: &SecretString,
    ) -> Result<SdkUser, WalletError> {
        if identifier.is_empty() || secret.expose_secret().is_empty() {
            return Err(WalletError::Authorization("identifier and secret are required".into()));
        }
        Ok(self.start_session(SdkUser {
            id: identifier.to_string(),
            display_name: Some(identifier.to_string()),
            avatar_url: None,
        }))
    }

    async fn wallet_state(&self) -> Result<EmbeddedWalletState, WalletError> {
        if !self.has_session() {
            return Err(WalletError::Connection("not signed in".into()));
        }
        if self.wallet_created.load(Ordering::SeqCst) {
            Ok(EmbeddedWalletState::Ready(self.handle()))
        } else {
            Ok(EmbeddedWalletState::NotCreated)
        }
    }

    async fn create_wallet(&self) -> Result<EmbeddedWalletHandle, WalletError> {
        if !self.has_session() {
            return Err(WalletError::Connection("not signed in".into()));
        }
        self.wallet_created.store(true, Ordering::SeqCst);
        Ok(self.handle())
    }

    async fn logout(&self) -> Result<(), WalletError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self.persisted.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn capability(&self) -> Capability {
        Capability::SignThenBroadcast(Arc::clone(&self.signer) as Arc<dyn SigningTransport>)
    }
}
