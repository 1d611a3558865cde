//! Connection registry
//!
//! Owns the account id → live transport mapping. Components that need to
//! send take the registry by `Arc` instead of reaching for process-global
//! state; accounts appear when registered and disappear when removed.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use zapflow_common::types::AccountId;

use super::Transport;

/// Registry of connected messaging accounts
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<AccountId, Arc<dyn Transport>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport for an account, replacing any previous one
    pub async fn register(&self, account_id: AccountId, transport: Arc<dyn Transport>) {
        info!(account = %account_id, "Registering transport");
        let mut inner = self.inner.write().await;
        inner.insert(account_id, transport);
    }

    /// Remove an account's transport
    pub async fn remove(&self, account_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.remove(account_id).is_some()
    }

    /// Look up the transport for an account
    pub async fn get(&self, account_id: &str) -> Option<Arc<dyn Transport>> {
        let inner = self.inner.read().await;
        inner.get(account_id).cloned()
    }

    /// All registered account ids
    pub async fn accounts(&self) -> Vec<AccountId> {
        let inner = self.inner.read().await;
        inner.keys().cloned().collect()
    }

    /// Account ids with a live connection right now.
    /// Disconnected accounts are simply absent: their messages stay queued.
    pub async fn connected_accounts(&self) -> Vec<AccountId> {
        let inner = self.inner.read().await;
        let mut connected: Vec<AccountId> = inner
            .iter()
            .filter(|(_, t)| t.is_connected())
            .map(|(id, _)| id.clone())
            .collect();
        connected.sort();
        connected
    }
}
