//! Generate → review → evaluate → summarize
//!
//! A `Pipeline` is assembled per request from the keys that apply to the
//! caller: the request itself, the signed-in user's stored keys, then the
//! server environment.

pub mod evaluate;
pub mod generate;
pub mod parse;
pub mod review;
pub mod templates;
pub mod types;

use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::ProviderArgs;
use crate::db::schemas::ApiKeys;
use crate::llm::{LlmBackend, OpenAiBackend};

pub use evaluate::{heuristic_evaluate, OumiEvaluator};
pub use generate::{CodeGenerator, TEMPLATE_PROVIDER};
pub use review::{static_review, AiReviewer};
pub use types::*;

pub const WORKFLOW_ID: &str = "devagent_workflow";
pub const DECISION_PASS: &str = "DECISION: PASS ✅";
pub const DECISION_NEEDS_IMPROVEMENT: &str = "DECISION: NEEDS IMPROVEMENT ⚠️";

/// Review keys this short are placeholders, not credentials
pub const MIN_REVIEW_KEY_LENGTH: usize = 11;

/// Keys resolved for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderKeys {
    pub together: Option<String>,
    pub groq: Option<String>,
    pub review: Option<String>,
    pub oumi: Option<String>,
}

fn first_key<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
        .map(str::to_string)
}

impl ProviderKeys {
    pub fn resolve(request_key: Option<&str>, user: Option<&ApiKeys>, env: &ProviderArgs) -> Self {
        let stored = user.cloned().unwrap_or_default();

        Self {
            together: first_key([
                request_key,
                stored.together_ai.as_deref(),
                env.together_api_key.as_deref(),
            ]),
            groq: first_key([stored.groq.as_deref(), env.groq_api_key.as_deref()]),
            review: first_key([
                stored.code_rabbit.as_deref(),
                stored.groq.as_deref(),
                env.coderabbit_api_key.as_deref(),
                env.groq_api_key.as_deref(),
            ]),
            oumi: first_key([stored.oumi.as_deref(), env.oumi_api_key.as_deref()]),
        }
    }
}

pub fn decision(review_score: f64, overall_score: f64) -> &'static str {
    if review_score >= 70.0 && overall_score >= 70.0 {
        DECISION_PASS
    } else {
        DECISION_NEEDS_IMPROVEMENT
    }
}

pub fn new_execution_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Figures a summary is built from
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFigures {
    pub files_generated: usize,
    pub issues_found: u32,
    pub review_score: f64,
    pub overall_score: f64,
}

pub fn build_summary(
    execution_id: String,
    orchestrator: Orchestrator,
    elapsed: Duration,
    figures: RunFigures,
) -> WorkflowSummary {
    WorkflowSummary {
        workflow_id: WORKFLOW_ID.to_string(),
        execution_id,
        timestamp: now_rfc3339(),
        orchestrator,
        metrics: SummaryMetrics {
            total_duration: format!("{:.2}s", elapsed.as_secs_f64()),
            files_generated: figures.files_generated,
            issues_found: figures.issues_found,
            quality_score: figures.overall_score,
        },
        results: SummaryResults {
            decision: decision(figures.review_score, figures.overall_score).to_string(),
        },
    }
}

pub struct Pipeline {
    generator: CodeGenerator,
    reviewer: Option<AiReviewer>,
    oumi: Option<OumiEvaluator>,
}

impl Pipeline {
    pub fn new(
        generator: CodeGenerator,
        reviewer: Option<AiReviewer>,
        oumi: Option<OumiEvaluator>,
    ) -> Self {
        Self {
            generator,
            reviewer,
            oumi,
        }
    }

    /// Wire hosted backends for the resolved keys
    pub fn from_keys(http: &Client, providers: &ProviderArgs, keys: &ProviderKeys) -> Self {
        let mut backends: Vec<Arc<dyn LlmBackend>> = Vec::new();
        if let Some(key) = &keys.together {
            backends.push(Arc::new(OpenAiBackend::together(
                http.clone(),
                &providers.together_api_url,
                &providers.together_model,
                key.clone(),
            )));
        }
        if let Some(key) = &keys.groq {
            backends.push(Arc::new(OpenAiBackend::groq(
                http.clone(),
                &providers.groq_api_url,
                &providers.groq_model,
                key.clone(),
            )));
        }

        let reviewer = keys
            .review
            .as_ref()
            .filter(|k| k.len() >= MIN_REVIEW_KEY_LENGTH)
            .map(|key| {
                AiReviewer::new(Arc::new(OpenAiBackend::groq(
                    http.clone(),
                    &providers.groq_api_url,
                    &providers.groq_model,
                    key.clone(),
                )))
            });

        let oumi = OumiEvaluator::new(http.clone(), &providers.oumi_api_url, keys.oumi.as_deref());

        Self::new(CodeGenerator::new(backends), reviewer, oumi)
    }

    pub fn generator(&self) -> &CodeGenerator {
        &self.generator
    }

    pub fn ai_review_enabled(&self) -> bool {
        self.reviewer.is_some()
    }

    pub async fn run(&self, request: &GenerateRequest) -> PipelineOutput {
        let started = Instant::now();
        let execution_id = new_execution_id();
        info!(
            execution_id = %execution_id,
            language = %request.language(),
            providers = ?self.generator.providers(),
            "Starting workflow"
        );

        let generation = self.generator.generate(request).await;
        let review = review::review(&generation.files, self.reviewer.as_ref(), request.prompt.trim()).await;
        let evaluation = evaluate::evaluate(&generation.files, &review, self.oumi.as_ref()).await;

        let summary = build_summary(
            execution_id,
            Orchestrator::Direct,
            started.elapsed(),
            RunFigures {
                files_generated: generation.files.len(),
                issues_found: review.summary.total,
                review_score: review.score as f64,
                overall_score: evaluation.overall_score,
            },
        );
        info!(
            execution_id = %summary.execution_id,
            duration = %summary.metrics.total_duration,
            decision = %summary.results.decision,
            "Workflow completed"
        );

        PipelineOutput {
            success: true,
            generation,
            review,
            evaluation,
            summary,
        }
    }
}
