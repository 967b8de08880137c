//! Drives login and logout across whichever provider is selected and keeps
//! the shared session state in step.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::error::WalletError;
use crate::provider::{LoginOptions, OnLogin, WalletProvider};
use crate::registry::ProviderRegistry;
use crate::status::StatusSink;
use crate::types::{AuthResult, LoginMethod, ProviderKind, ProviderStatus};

/// What the rest of the application knows about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub provider_kind: Option<ProviderKind>,
    pub address: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.provider_kind.is_some()
    }
}

impl From<&AuthResult> for SessionState {
    fn from(result: &AuthResult) -> Self {
        Self {
            provider_kind: Some(result.provider_kind.clone()),
            address: Some(result.address.clone()),
            display_name: result.profile.display_name.clone(),
            avatar_url: result.profile.avatar_url.clone(),
        }
    }
}

/// Shared, synchronously updated session state.
pub type SessionStore = Arc<RwLock<SessionState>>;

/// Continuation used when a caller does not supply one.
pub type DefaultContinuation = Arc<dyn Fn(&AuthResult) + Send + Sync>;

pub struct AuthOrchestrator {
    registry: Arc<ProviderRegistry>,
    selected: ProviderKind,
    session: SessionStore,
    default_continuation: DefaultContinuation,
}

impl AuthOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        selected: ProviderKind,
        session: SessionStore,
        default_continuation: DefaultContinuation,
    ) -> Self {
        Self {
            registry,
            selected,
            session,
            default_continuation,
        }
    }

    pub fn selected(&self) -> &ProviderKind {
        &self.selected
    }

    pub fn session(&self) -> SessionState {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn session_store(&self) -> SessionStore {
        Arc::clone(&self.session)
    }

    pub fn selected_provider(&self) -> Result<Arc<dyn WalletProvider>, WalletError> {
        self.registry.require(&self.selected)
    }

    /// Record a session a provider resumed on its own, without running any
    /// continuation.
    pub fn restore(&self, result: &AuthResult) {
        tracing::info!(provider = %result.provider_kind, "session restored");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = SessionState::from(result);
    }

    /// Log in through the selected provider.
    ///
    /// The session is updated before `on_success` (or the default
    /// continuation) runs.
    pub async fn login(
        &self,
        method: LoginMethod,
        status: Option<StatusSink>,
        on_success: Option<OnLogin>,
    ) -> Result<AuthResult, WalletError> {
        let provider = self.selected_provider()?;
        tracing::info!(provider = %self.selected, method = method.label(), "login requested");

        let session = Arc::clone(&self.session);
        let continuation: OnLogin = match on_success {
            Some(f) => f,
            None => {
                let default = Arc::clone(&self.default_continuation);
                Box::new(move |result: &AuthResult| default(result))
            }
        };

        let options = LoginOptions {
            method,
            status,
            on_success: Some(Box::new(move |result: &AuthResult| {
                *session.write().unwrap_or_else(PoisonError::into_inner) =
                    SessionState::from(result);
                continuation(result);
            })),
        };

        provider.login(options).await
    }

    /// Log out of the provider the session names and clear the session,
    /// even when the provider fails.
    ///
    /// With no session, a selected provider that is still live is logged out.
    pub async fn logout(&self, status: Option<StatusSink>) -> Result<(), WalletError> {
        let kind = self.session().provider_kind.or_else(|| {
            self.registry
                .get_provider(&self.selected)
                .filter(|p| p.status() != ProviderStatus::Disconnected)
                .map(|_| self.selected.clone())
        });
        let result = match &kind {
            None => Ok(()),
            Some(kind) => match self.registry.get_provider(kind) {
                Some(provider) => provider.logout(status).await,
                None => Err(WalletError::ProviderNotRegistered(kind.clone())),
            },
        };

        *self.session.write().unwrap_or_else(PoisonError::into_inner) = SessionState::default();
        match &result {
            Ok(()) => tracing::info!(provider = ?kind, "logged out"),
            Err(e) => tracing::warn!(provider = ?kind, error = %e, "logout failed, session cleared anyway"),
        }
        result
    }
}
