//! Per-caller client workspaces: a facade bound to the caller's credential
//! plus the cache in front of it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::cache::{CachePolicy, QueryCache, TodoQueries};
use crate::client::{CredentialSlot, TodoClient};
use crate::config::{CacheConfig, RemoteConfig};
use crate::metrics::Metrics;
use crate::utils::clock::Clock;

pub struct Workspace {
    pub credential: CredentialSlot,
    pub queries: TodoQueries,
}

pub struct Workspaces {
    sessions: Mutex<HashMap<String, Arc<Workspace>>>,
    http: reqwest::Client,
    remote: RemoteConfig,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl Workspaces {
    pub fn new(
        http: reqwest::Client,
        remote: &RemoteConfig,
        cache: &CacheConfig,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Workspaces {
            sessions: Mutex::new(HashMap::new()),
            http,
            remote: remote.clone(),
            policy: CachePolicy::from(cache),
            clock,
            metrics,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Workspace>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The workspace of `subject`, created on first use. The credential slot
    /// always carries the token of the latest request.
    pub fn for_session(&self, subject: &str, token: &str) -> Arc<Workspace> {
        let mut sessions = self.sessions();
        let workspace = sessions
            .entry(subject.to_string())
            .or_insert_with(|| {
                debug!("Creating client workspace for subject '{}'", subject);
                let credential = CredentialSlot::new(None);
                let client = TodoClient::new(
                    self.http.clone(),
                    &self.remote,
                    credential.clone(),
                    self.metrics.clone(),
                );
                let cache = QueryCache::new(self.policy, self.clock.clone())
                    .with_metrics(self.metrics.clone());
                Arc::new(Workspace {
                    credential,
                    queries: TodoQueries::new(Arc::new(client), cache),
                })
            })
            .clone();
        workspace.credential.set(token);
        workspace
    }

    pub fn drop_session(&self, subject: &str) -> bool {
        self.sessions().remove(subject).is_some()
    }

    /// Evicts expired cache entries and forgets workspaces left empty.
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions();
        let mut evicted = 0;
        sessions.retain(|_, workspace| {
            evicted += workspace.queries.cache().evict_expired();
            !workspace.queries.cache().is_empty()
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
