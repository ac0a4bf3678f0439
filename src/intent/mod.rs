//! Federated login intents and their single terminal transition.
//!
//! An intent is created elsewhere in state [`IntentState::Pending`] when a login
//! flow starts. The callback that completes it moves it to exactly one terminal
//! state. [`IntentLifecycle`] is the only path through which handlers observe or
//! change intents.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use memory::{IntentOutcome, MemoryIntentStore};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{CallbackError, DomainError, StoreError},
    idp::{IdpArguments, IdpError, IdpSession, IdpTokens, IdpUser, SamlAssertion, SamlSession},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Pending,
    Succeeded,
    Failed,
}

/// One in-flight federated login attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub idp_id: String,
    pub state: IntentState,
    /// Provider-specific values recorded when the flow started (PKCE verifier, nonce).
    #[serde(default)]
    pub idp_arguments: IdpArguments,
    /// Id of the SAML AuthnRequest this intent is waiting for.
    #[serde(default)]
    pub request_id: Option<String>,
    pub success_url: Url,
    pub failure_url: Url,
    pub created_at: DateTime<Utc>,
}

impl Intent {
    pub fn new(
        id: impl Into<String>,
        idp_id: impl Into<String>,
        success_url: Url,
        failure_url: Url,
    ) -> Self {
        Self {
            id: id.into(),
            idp_id: idp_id.into(),
            state: IntentState::Pending,
            idp_arguments: IdpArguments::new(),
            request_id: None,
            success_url,
            failure_url,
            created_at: Utc::now(),
        }
    }

    pub fn with_arguments(mut self, arguments: IdpArguments) -> Self {
        self.idp_arguments = arguments;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Persistence of intents.
///
/// Implementations must serialize transitions per intent: once an intent is
/// terminal, further `fail_intent` or `succeed_*` calls return
/// [`StoreError::Conflict`].
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Load an intent in whatever state it is in.
    async fn intent(&self, intent_id: &str) -> Result<Intent, StoreError>;

    async fn fail_intent(&self, intent: &Intent, reason: &str) -> Result<(), StoreError>;

    /// Mark the intent succeeded and return the token the application redeems it with.
    async fn succeed_intent(
        &self,
        intent: &Intent,
        user: &IdpUser,
        tokens: Option<&IdpTokens>,
        user_id: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Like [`succeed_intent`](Self::succeed_intent), also persisting the assertion
    /// so a later single logout can reference its session index.
    async fn succeed_saml_intent(
        &self,
        intent: &Intent,
        user: &IdpUser,
        user_id: Option<&str>,
        assertion: &SamlAssertion,
    ) -> Result<String, StoreError>;
}

pub type SharedIntentStore = Arc<dyn IntentStore>;

/// Loads active intents and drives them to a terminal state.
#[derive(Clone)]
pub struct IntentLifecycle {
    store: SharedIntentStore,
}

impl IntentLifecycle {
    pub fn new(store: SharedIntentStore) -> Self {
        Self { store }
    }

    /// Load an intent that is still pending.
    ///
    /// Terminal intents are reported exactly like unknown ones, which makes a
    /// replayed callback fail before any provider is contacted.
    pub async fn load_active(&self, intent_id: &str) -> Result<Intent, CallbackError> {
        match self.store.intent(intent_id).await {
            Ok(intent) if intent.state == IntentState::Pending => Ok(intent),
            Ok(_) | Err(StoreError::NotFound(_)) => {
                Err(DomainError::not_found("IDP-Inte7", "Intent not found or already finished").into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark the intent failed. Persistence errors are logged, the caller still redirects.
    pub async fn fail(&self, intent: &Intent, reason: &str) {
        if let Err(e) = self.store.fail_intent(intent, reason).await {
            tracing::error!(
                intent = %intent.id,
                error = %e,
                "Failed to push failed event on idp intent"
            );
        }
    }

    pub async fn succeed(
        &self,
        intent: &Intent,
        user: &IdpUser,
        session: &dyn IdpSession,
        user_id: Option<&str>,
    ) -> Result<String, CallbackError> {
        let tokens = session.tokens();
        self.store
            .succeed_intent(intent, user, tokens.as_ref(), user_id)
            .await
            .map_err(token_creation_failed)
    }

    pub async fn succeed_saml(
        &self,
        intent: &Intent,
        user: &IdpUser,
        session: &SamlSession,
        user_id: Option<&str>,
    ) -> Result<String, CallbackError> {
        let assertion = session
            .assertion()
            .ok_or_else(|| token_creation_failed(IdpError::UserNotFetched))?;
        self.store
            .succeed_saml_intent(intent, user, user_id, assertion)
            .await
            .map_err(token_creation_failed)
    }
}

fn token_creation_failed(source: impl std::error::Error + Send + Sync + 'static) -> CallbackError {
    DomainError::internal("IDP-JdD3g", "Token creation failed")
        .with_source(source)
        .into()
}
