//! Issuance flows in progress, one per `(issuer, configuration, user)`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use super::model::TokenState;
use crate::dpop::DpopKeyPair;


#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowKey {
    pub credential_issuer_identifier: String,
    pub credential_configuration_id: String,
    pub user_handle: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceFlowState {
    pub key: FlowKey,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpop: Option<DpopKeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_response: Option<TokenState>,
    #[serde(with = "time::serde::timestamp")]
    pub created: OffsetDateTime,
}

impl IssuanceFlowState {
    pub fn new(key: FlowKey, state: String, now: OffsetDateTime) -> Self {
        Self {
            key,
            state,
            code_verifier: None,
            dpop: None,
            token_response: None,
            created: now,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsedState {
    state: String,
    #[serde(with = "time::serde::timestamp")]
    used_at: OffsetDateTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Snapshot {
    flows: Vec<IssuanceFlowState>,
    used_states: Vec<UsedState>,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait IssuanceFlowRepository: Send + Sync {
    /// Stores `flow`, replacing any flow with the same key.
    async fn upsert(&self, flow: IssuanceFlowState);

    async fn get(&self, key: &FlowKey) -> Option<IssuanceFlowState>;

    async fn find_by_state(&self, state: &str, user_handle: &str) -> Option<IssuanceFlowState>;

    /// Returns `false` if `state` was already consumed.
    async fn mark_state_used(&self, state: &str) -> bool;

    async fn remove(&self, key: &FlowKey);

    /// Drops flows and consumed states older than the configured window; returns how many
    /// flows were removed.
    async fn sweep_expired(&self, now: OffsetDateTime) -> usize;

    async fn snapshot(&self) -> Result<serde_json::Value, serde_json::Error>;

    async fn restore(&self, snapshot: serde_json::Value) -> Result<(), serde_json::Error>;
}

#[derive(Default)]
struct Inner {
    flows: HashMap<FlowKey, IssuanceFlowState>,
    /// Consumed `state` values and when they were consumed.
    used_states: HashMap<String, OffsetDateTime>,
}

impl Inner {
    fn sweep(&mut self, now: OffsetDateTime, remember_for: Duration) -> usize {
        let before = self.flows.len();
        self.flows
            .retain(|_, flow| within_window(flow.created, now, remember_for));
        self.used_states
            .retain(|_, used_at| within_window(*used_at, now, remember_for));
        before - self.flows.len()
    }
}

fn within_window(since: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    since
        .checked_add(window)
        .map_or(true, |expires_at| now <= expires_at)
}

pub struct InMemoryIssuanceFlowRepository {
    remember_for: Duration,
    inner: Mutex<Inner>,
}

impl InMemoryIssuanceFlowRepository {
    pub fn new(remember_issuer_for_seconds: u64) -> Self {
        Self {
            remember_for: Duration::seconds(
                i64::try_from(remember_issuer_for_seconds).unwrap_or(i64::MAX),
            ),
            inner: Mutex::new(Inner::default()),
        }
    }
}

#[async_trait]
impl IssuanceFlowRepository for InMemoryIssuanceFlowRepository {
    async fn upsert(&self, flow: IssuanceFlowState) {
        let mut inner = self.inner.lock().await;
        inner.sweep(OffsetDateTime::now_utc(), self.remember_for);
        inner.flows.insert(flow.key.clone(), flow);
    }

    async fn get(&self, key: &FlowKey) -> Option<IssuanceFlowState> {
        let mut inner = self.inner.lock().await;
        inner.sweep(OffsetDateTime::now_utc(), self.remember_for);
        inner.flows.get(key).cloned()
    }

    async fn find_by_state(&self, state: &str, user_handle: &str) -> Option<IssuanceFlowState> {
        let mut inner = self.inner.lock().await;
        inner.sweep(OffsetDateTime::now_utc(), self.remember_for);
        inner
            .flows
            .values()
            .find(|flow| flow.state == state && flow.key.user_handle == user_handle)
            .cloned()
    }

    async fn mark_state_used(&self, state: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.used_states.contains_key(state) {
            return false;
        }
        inner
            .used_states
            .insert(state.to_owned(), OffsetDateTime::now_utc());
        true
    }

    async fn remove(&self, key: &FlowKey) {
        self.inner.lock().await.flows.remove(key);
    }

    async fn sweep_expired(&self, now: OffsetDateTime) -> usize {
        let removed = self.inner.lock().await.sweep(now, self.remember_for);
        if removed > 0 {
            tracing::debug!(removed, "expired issuance flows removed");
        }
        removed
    }

    async fn snapshot(&self) -> Result<serde_json::Value, serde_json::Error> {
        let inner = self.inner.lock().await;
        let mut used_states: Vec<UsedState> = inner
            .used_states
            .iter()
            .map(|(state, used_at)| UsedState {
                state: state.to_owned(),
                used_at: *used_at,
            })
            .collect();
        used_states.sort_by(|a, b| a.state.cmp(&b.state));

        serde_json::to_value(Snapshot {
            flows: inner.flows.values().cloned().collect(),
            used_states,
        })
    }

    async fn restore(&self, snapshot: serde_json::Value) -> Result<(), serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_value(snapshot)?;

        let mut inner = self.inner.lock().await;
        inner.flows = snapshot
            .flows
            .into_iter()
            .map(|flow| (flow.key.clone(), flow))
            .collect();
        inner.used_states = snapshot
            .used_states
            .into_iter()
            .map(|used| (used.state, used.used_at))
            .collect();
        inner.sweep(OffsetDateTime::now_utc(), self.remember_for);
        Ok(())
    }
}
