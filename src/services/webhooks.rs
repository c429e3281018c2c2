//! Results posted back by orchestrated workflow runs
//!
//! A Kestra flow reports its stage outputs to `/api/kestra-webhook`; the
//! generate handler picks them up by execution id once the run finishes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long unclaimed results are kept
pub const WEBHOOK_RESULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default cap on unclaimed results
pub const MAX_WEBHOOK_RESULTS: usize = 1000;

/// Body of `POST /api/kestra-webhook`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub generation: Option<Value>,
    #[serde(default)]
    pub review: Option<Value>,
    #[serde(default)]
    pub evaluation: Option<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
}

/// Stage outputs of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResults {
    pub workflow_id: String,
    pub execution_id: String,
    pub status: Option<String>,
    pub generation: Option<Value>,
    pub review: Option<Value>,
    pub evaluation: Option<Value>,
    pub summary: Option<Value>,
    pub received_at: DateTime<Utc>,
}

impl WorkflowResults {
    /// True when the run reported at least a generation result
    pub fn has_results(&self) -> bool {
        self.generation.as_ref().is_some_and(|g| !g.is_null())
    }
}

impl TryFrom<WebhookPayload> for WorkflowResults {
    type Error = &'static str;

    fn try_from(payload: WebhookPayload) -> Result<Self, Self::Error> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        match (non_empty(payload.workflow_id), non_empty(payload.execution_id)) {
            (Some(workflow_id), Some(execution_id)) => Ok(Self {
                workflow_id,
                execution_id,
                status: payload.status,
                generation: payload.generation,
                review: payload.review,
                evaluation: payload.evaluation,
                summary: payload.summary,
                received_at: Utc::now(),
            }),
            _ => Err("Missing required fields: workflow_id, execution_id"),
        }
    }
}

/// In-memory results keyed by execution id, bounded by `capacity`
pub struct WebhookStore {
    results: DashMap<String, WorkflowResults>,
    capacity: usize,
}

impl Default for WebhookStore {
    fn default() -> Self {
        Self::with_capacity(MAX_WEBHOOK_RESULTS)
    }
}

impl WebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store results, evicting the oldest entries when the store is full.
    /// Returns how many entries were evicted.
    pub fn put(&self, results: WorkflowResults) -> usize {
        let mut evicted = 0;
        if !self.results.contains_key(&results.execution_id) {
            while self.results.len() >= self.capacity {
                let Some(oldest) = self.oldest() else { break };
                if self.results.remove(&oldest).is_some() {
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            warn!(
                evicted,
                capacity = self.capacity,
                "Webhook store full, evicted oldest results"
            );
        }
        debug!(execution_id = %results.execution_id, "Stored workflow results");
        self.results.insert(results.execution_id.clone(), results);
        evicted
    }

    fn oldest(&self) -> Option<String> {
        self.results
            .iter()
            .min_by_key(|entry| entry.value().received_at)
            .map(|entry| entry.key().clone())
    }

    pub fn get(&self, execution_id: &str) -> Option<WorkflowResults> {
        self.results.get(execution_id).map(|r| r.clone())
    }

    /// Remove and return results for an execution
    pub fn take(&self, execution_id: &str) -> Option<WorkflowResults> {
        self.results.remove(execution_id).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Drop results older than `ttl`
    pub fn cleanup(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(ttl.as_secs() as i64);
        let before = self.results.len();
        self.results.retain(|_, r| r.received_at > cutoff);
        before - self.results.len()
    }
}

pub fn spawn_cleanup_task(store: Arc<WebhookStore>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            let removed = store.cleanup(WEBHOOK_RESULT_TTL);
            if removed > 0 {
                debug!("Webhook cleanup: removed {} stale results", removed);
            }
        }
    });
    info!("Webhook result cleanup task started");
}
