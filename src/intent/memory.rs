use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tokio::sync::RwLock;

use super::{Intent, IntentState, IntentStore};
use crate::{
    error::StoreError,
    idp::{IdpTokens, IdpUser, SamlAssertion},
};

/// Terminal data recorded for an intent.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Succeeded {
        token: String,
        user: IdpUser,
        user_id: Option<String>,
        tokens: Option<IdpTokens>,
        assertion: Option<SamlAssertion>,
    },
    Failed {
        reason: String,
    },
}

struct Entry {
    intent: Intent,
    outcome: Option<IntentOutcome>,
}

/// In-memory intent store.
///
/// Used by the standalone server and in tests. All transitions are applied
/// under one write lock, so two concurrent finalizations of the same intent
/// cannot both succeed.
#[derive(Default)]
pub struct MemoryIntentStore {
    intents: RwLock<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent started elsewhere.
    pub async fn insert(&self, intent: Intent) {
        let mut intents = self.intents.write().await;
        intents.insert(
            intent.id.clone(),
            Entry {
                intent,
                outcome: None,
            },
        );
    }

    pub async fn outcome(&self, intent_id: &str) -> Option<IntentOutcome> {
        let intents = self.intents.read().await;
        intents.get(intent_id)?.outcome.clone()
    }

    /// Make every operation fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Backend("intent store unavailable".into()));
        }
        Ok(())
    }

    async fn finish(&self, intent_id: &str, outcome: IntentOutcome) -> Result<(), StoreError> {
        self.check_available()?;
        let mut intents = self.intents.write().await;
        let entry = intents
            .get_mut(intent_id)
            .ok_or_else(|| StoreError::NotFound(format!("intent {intent_id}")))?;
        if entry.intent.state != IntentState::Pending {
            return Err(StoreError::Conflict(format!(
                "intent {intent_id} already finished"
            )));
        }
        entry.intent.state = match outcome {
            IntentOutcome::Succeeded { .. } => IntentState::Succeeded,
            IntentOutcome::Failed { .. } => IntentState::Failed,
        };
        entry.outcome = Some(outcome);
        Ok(())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn intent(&self, intent_id: &str) -> Result<Intent, StoreError> {
        self.check_available()?;
        let intents = self.intents.read().await;
        intents
            .get(intent_id)
            .map(|entry| entry.intent.clone())
            .ok_or_else(|| StoreError::NotFound(format!("intent {intent_id}")))
    }

    async fn fail_intent(&self, intent: &Intent, reason: &str) -> Result<(), StoreError> {
        self.finish(
            &intent.id,
            IntentOutcome::Failed {
                reason: reason.to_string(),
            },
        )
        .await
    }

    async fn succeed_intent(
        &self,
        intent: &Intent,
        user: &IdpUser,
        tokens: Option<&IdpTokens>,
        user_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let token = generate_token();
        self.finish(
            &intent.id,
            IntentOutcome::Succeeded {
                token: token.clone(),
                user: user.clone(),
                user_id: user_id.map(str::to_string),
                tokens: tokens.cloned(),
                assertion: None,
            },
        )
        .await?;
        Ok(token)
    }

    async fn succeed_saml_intent(
        &self,
        intent: &Intent,
        user: &IdpUser,
        user_id: Option<&str>,
        assertion: &SamlAssertion,
    ) -> Result<String, StoreError> {
        let token = generate_token();
        self.finish(
            &intent.id,
            IntentOutcome::Succeeded {
                token: token.clone(),
                user: user.clone(),
                user_id: user_id.map(str::to_string),
                tokens: None,
                assertion: Some(assertion.clone()),
            },
        )
        .await?;
        Ok(token)
    }
}
