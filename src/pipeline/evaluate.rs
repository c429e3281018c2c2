//! Quality evaluation of generated code
//!
//! The hosted Oumi evaluator is used when a key is configured. Otherwise, or
//! when the service fails, a deterministic heuristic derives the metrics from
//! the review result.

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::review::is_reviewable;
use super::types::{
    now_rfc3339, EvaluationAnalysis, EvaluationMetrics, EvaluationResult, Evaluator,
    GeneratedFile, ReviewResult, Severity,
};

/// Oumi keys shorter than this are treated as missing
pub const MIN_OUMI_KEY_LENGTH: usize = 10;
const MAX_OUMI_FILES: usize = 5;
const MAX_OUMI_CONTENT_CHARS: usize = 2000;

const METRIC_NAMES: [&str; 5] = [
    "code_quality",
    "maintainability",
    "security",
    "performance",
    "best_practices",
];

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn code_files(files: &[GeneratedFile]) -> Vec<&GeneratedFile> {
    files.iter().filter(|f| is_reviewable(&f.language)).collect()
}

fn analyze(files: &[&GeneratedFile]) -> EvaluationAnalysis {
    let total_lines: usize = files.iter().map(|f| f.content.split('\n').count()).sum();
    let avg = total_lines as f64 / files.len().max(1) as f64;
    let languages: BTreeSet<String> = files.iter().map(|f| f.language.clone()).collect();

    EvaluationAnalysis {
        total_files: files.len(),
        total_lines,
        avg_file_size: round2(avg),
        languages: languages.into_iter().collect(),
    }
}

/// Recommendations for a set of scores
pub fn recommendations(overall: f64, quality: f64, security: f64, critical: u32) -> Vec<String> {
    let mut out = Vec::new();

    if overall < 70.0 {
        out.push("Overall code quality needs improvement".to_string());
    }
    if quality < 60.0 {
        out.push("Address code quality issues found in review".to_string());
    }
    if security < 70.0 {
        out.push("Critical: Fix security vulnerabilities".to_string());
    }
    if critical > 0 {
        out.push(format!("Fix {} critical issues immediately", critical));
    }
    if overall >= 80.0 {
        out.push("Code quality is good! Minor improvements suggested".to_string());
    }
    if out.is_empty() {
        out.push("Excellent code quality! Ready for deployment".to_string());
    }

    out
}

/// Deterministic evaluation derived from the review
pub fn heuristic_evaluate(files: &[GeneratedFile], review: &ReviewResult) -> EvaluationResult {
    let code = code_files(files);
    let analysis = analyze(&code);

    let review_score = review.score as f64;
    let issue_count = review.issues.len() as f64;
    let critical = review
        .issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .count() as u32;

    let code_quality = (review_score - issue_count * 2.0).max(0.0);

    let mut maintainability: f64 = 85.0;
    if analysis.avg_file_size > 500.0 {
        maintainability -= 10.0;
    }
    if analysis.total_files > 10 {
        maintainability -= 5.0;
    }

    let security = (90.0 - 15.0 * critical as f64).clamp(0.0, 100.0);
    let performance = 80.0;
    let best_practices = review_score * 0.9;

    let overall = code_quality * 0.3
        + maintainability * 0.2
        + security * 0.2
        + performance * 0.15
        + best_practices * 0.15;

    EvaluationResult {
        success: true,
        overall_score: round2(overall),
        metrics: EvaluationMetrics {
            code_quality: round2(code_quality),
            maintainability: round2(maintainability),
            security: round2(security),
            performance: round2(performance),
            best_practices: round2(best_practices),
        },
        analysis,
        recommendations: recommendations(overall, code_quality, security, critical),
        evaluator: Evaluator::Heuristic,
        timestamp: now_rfc3339(),
    }
}

#[derive(Debug, Serialize)]
struct OumiRequest<'a> {
    task: &'static str,
    code_files: Vec<OumiFile<'a>>,
    context: OumiContext,
    metrics: [&'static str; 5],
}

#[derive(Debug, Serialize)]
struct OumiFile<'a> {
    name: &'a str,
    content: String,
    language: &'a str,
}

#[derive(Debug, Serialize)]
struct OumiContext {
    review_score: u32,
    issue_count: usize,
    critical_issues: u32,
}

#[derive(Debug, Deserialize)]
struct OumiResponse {
    #[serde(default)]
    overall_score: f64,
    #[serde(default)]
    metrics: EvaluationMetrics,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// Client for the hosted Oumi evaluation API
pub struct OumiEvaluator {
    client: Client,
    api_url: String,
    api_key: String,
}

impl OumiEvaluator {
    /// `None` when the key is missing or too short to be real
    pub fn new(client: Client, api_url: &str, api_key: Option<&str>) -> Option<Self> {
        let api_key = api_key.map(str::trim).filter(|k| k.len() >= MIN_OUMI_KEY_LENGTH)?;
        Some(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn request(
        &self,
        code: &[&GeneratedFile],
        review: &ReviewResult,
    ) -> Result<OumiResponse, String> {
        let payload = OumiRequest {
            task: "code_quality_evaluation",
            code_files: code
                .iter()
                .take(MAX_OUMI_FILES)
                .map(|f| OumiFile {
                    name: &f.path,
                    content: f.content.chars().take(MAX_OUMI_CONTENT_CHARS).collect(),
                    language: &f.language,
                })
                .collect(),
            context: OumiContext {
                review_score: review.score,
                issue_count: review.issues.len(),
                critical_issues: review.summary.critical,
            },
            metrics: METRIC_NAMES,
        };

        let response = self
            .client
            .post(format!("{}/evaluate", self.api_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(format!("HTTP {}", response.status()));
        }

        response.json().await.map_err(|e| e.to_string())
    }

    /// Evaluate through Oumi, falling back to the heuristic on any failure
    pub async fn evaluate(&self, files: &[GeneratedFile], review: &ReviewResult) -> EvaluationResult {
        let code = code_files(files);

        match self.request(&code, review).await {
            Ok(response) => {
                debug!(score = response.overall_score, "Oumi evaluation received");
                EvaluationResult {
                    success: true,
                    overall_score: round2(response.overall_score),
                    metrics: response.metrics,
                    analysis: analyze(&code),
                    recommendations: response.recommendations,
                    evaluator: Evaluator::Oumi,
                    timestamp: now_rfc3339(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Oumi evaluation failed, using heuristic evaluation");
                heuristic_evaluate(files, review)
            }
        }
    }
}

/// Evaluation stage
pub async fn evaluate(
    files: &[GeneratedFile],
    review: &ReviewResult,
    oumi: Option<&OumiEvaluator>,
) -> EvaluationResult {
    let result = match oumi {
        Some(oumi) => oumi.evaluate(files, review).await,
        None => heuristic_evaluate(files, review),
    };
    info!(
        overall = result.overall_score,
        evaluator = ?result.evaluator,
        "Evaluation completed"
    );
    result
}
