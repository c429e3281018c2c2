//! Kestra workflow orchestration client
//!
//! When enabled, generation is first offered to a Kestra flow. The flow runs
//! the same stages and posts its outputs back through the webhook; this
//! client triggers the run, polls it to a terminal state, and collects the
//! results. Any failure sends the caller back to the direct pipeline.

use reqwest::{header, Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::webhooks::WebhookStore;
use crate::config::KestraArgs;
use crate::pipeline::{build_summary, GenerateRequest, Orchestrator, RunFigures, WorkflowSummary};

#[derive(Debug, thiserror::Error)]
pub enum KestraError {
    #[error("Kestra request failed: {0}")]
    Http(String),

    #[error("Kestra API error: HTTP {status}")]
    Status { status: u16 },

    #[error("Kestra execution {id} ended in state {state}")]
    Failed { id: String, state: String },

    #[error("Kestra execution {id} did not finish within {secs}s")]
    Timeout { id: String, secs: u64 },

    #[error("Kestra execution {0} produced no results")]
    MissingResults(String),
}

impl From<reqwest::Error> for KestraError {
    fn from(e: reqwest::Error) -> Self {
        KestraError::Http(e.to_string())
    }
}

/// Inputs handed to the flow
#[derive(Debug, Clone, Serialize)]
pub struct KestraInput {
    pub user_prompt: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

impl From<&GenerateRequest> for KestraInput {
    fn from(request: &GenerateRequest) -> Self {
        Self {
            user_prompt: request.prompt.trim().to_string(),
            language: request.language(),
            framework: request.framework().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub histories: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KestraExecution {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub flow_id: String,
    #[serde(default)]
    pub state: ExecutionState,
    #[serde(default)]
    pub outputs: Option<Value>,
}

impl KestraExecution {
    pub fn is_success(&self) -> bool {
        self.state.current == "SUCCESS"
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state.current.as_str(), "FAILED" | "KILLED")
    }
}

/// Results of an orchestrated run, shaped like a direct pipeline response
#[derive(Debug, Clone, Serialize)]
pub struct KestraRun {
    pub success: bool,
    pub generation: Value,
    pub review: Value,
    pub evaluation: Value,
    pub summary: WorkflowSummary,
}

fn figures(generation: &Value, review: &Value, evaluation: &Value) -> RunFigures {
    RunFigures {
        files_generated: generation
            .get("files")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0),
        issues_found: review
            .pointer("/summary/total")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        review_score: review.get("score").and_then(Value::as_f64).unwrap_or(0.0),
        overall_score: evaluation
            .get("overall_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    }
}

pub struct KestraClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    namespace: String,
    flow_id: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl KestraClient {
    pub fn from_args(http: Client, args: &KestraArgs) -> Self {
        Self {
            http,
            base_url: args.kestra_api_url.trim_end_matches('/').to_string(),
            api_key: args
                .kestra_api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            namespace: args.kestra_namespace.clone(),
            flow_id: args.kestra_flow_id.clone(),
            poll_interval: Duration::from_millis(args.kestra_poll_interval_ms),
            timeout: Duration::from_secs(args.kestra_timeout_secs),
        }
    }

    /// Override polling cadence
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(header::AUTHORIZATION, format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, KestraError> {
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            return Err(KestraError::Status {
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// True when the flows endpoint answers with success
    pub async fn is_available(&self) -> bool {
        let request = self.authorized(self.http.get(format!("{}/api/v1/flows", self.base_url)));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Kestra not available");
                false
            }
        }
    }

    pub async fn trigger(&self, input: &KestraInput) -> Result<KestraExecution, KestraError> {
        let url = format!(
            "{}/api/v1/executions/{}/{}",
            self.base_url, self.namespace, self.flow_id
        );
        let execution: KestraExecution = self.send(self.http.post(url).json(input)).await?;
        info!(execution_id = %execution.id, flow = %self.flow_id, "Kestra execution triggered");
        Ok(execution)
    }

    pub async fn get_status(&self, execution_id: &str) -> Result<KestraExecution, KestraError> {
        let url = format!("{}/api/v1/executions/{}", self.base_url, execution_id);
        self.send(self.http.get(url)).await
    }

    pub async fn get_logs(&self, execution_id: &str) -> Result<Vec<Value>, KestraError> {
        let url = format!("{}/api/v1/executions/{}/logs", self.base_url, execution_id);
        self.send(self.http.get(url)).await
    }

    /// Poll until the execution reaches a terminal state or the deadline passes
    pub async fn wait_for_completion(&self, execution_id: &str) -> Result<KestraExecution, KestraError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let execution = self.get_status(execution_id).await?;
            debug!(execution_id, state = %execution.state.current, "Kestra execution status");

            if execution.is_success() {
                return Ok(execution);
            }
            if execution.is_failed() {
                return Err(KestraError::Failed {
                    id: execution.id,
                    state: execution.state.current,
                });
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(KestraError::Timeout {
                    id: execution_id.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Run the flow end to end. Results come from the webhook store first,
    /// then from the execution's own outputs.
    pub async fn run(
        &self,
        request: &GenerateRequest,
        webhooks: &Arc<WebhookStore>,
    ) -> Result<KestraRun, KestraError> {
        let started = Instant::now();
        let execution = self.trigger(&KestraInput::from(request)).await?;
        let finished = self.wait_for_completion(&execution.id).await?;

        let (generation, review, evaluation) = match webhooks.take(&finished.id) {
            Some(results) if results.has_results() => (
                results.generation.unwrap_or(Value::Null),
                results.review.unwrap_or(Value::Null),
                results.evaluation.unwrap_or(Value::Null),
            ),
            _ => {
                let outputs = finished.outputs.clone().unwrap_or(Value::Null);
                let stage = |name: &str| outputs.get(name).cloned().unwrap_or(Value::Null);
                let generation = stage("generation");
                if generation.is_null() {
                    warn!(execution_id = %finished.id, "Kestra execution finished without results");
                    return Err(KestraError::MissingResults(finished.id));
                }
                (generation, stage("review"), stage("evaluation"))
            }
        };

        let summary = build_summary(
            finished.id.clone(),
            Orchestrator::Kestra,
            started.elapsed(),
            figures(&generation, &review, &evaluation),
        );
        info!(
            execution_id = %finished.id,
            decision = %summary.results.decision,
            "Kestra workflow completed"
        );

        Ok(KestraRun {
            success: true,
            generation,
            review,
            evaluation,
            summary,
        })
    }
}
