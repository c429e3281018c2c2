//! Values passed between pipeline stages and returned to the dashboard

use serde::{Deserialize, Serialize};

fn default_language() -> String {
    "typescript".to_string()
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub framework: Option<String>,
    /// Together AI key supplied with the request, overriding stored keys
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request opt out of the Kestra detour
    #[serde(default)]
    pub use_kestra: Option<bool>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            language: language.into(),
            framework: None,
            api_key: None,
            use_kestra: None,
        }
    }

    /// Lowercased language, defaulting to typescript when blank
    pub fn language(&self) -> String {
        let language = self.language.trim().to_lowercase();
        if language.is_empty() {
            default_language()
        } else {
            language
        }
    }

    /// Framework with blanks treated as absent
    pub fn framework(&self) -> Option<&str> {
        self.framework
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub files: Vec<GeneratedFile>,
    pub summary: String,
    /// Which link of the provider chain produced the files
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    /// Points deducted from a perfect score per issue
    pub fn weight(self) -> u32 {
        match self {
            Self::Critical => 20,
            Self::Major => 10,
            Self::Minor => 5,
            Self::Info => 1,
        }
    }

    /// Lenient parse for AI output; anything unrecognised is informational
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "critical" | "blocker" | "error" => Self::Critical,
            "major" | "high" | "warning" => Self::Major,
            "minor" | "medium" | "low" => Self::Minor,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    Static,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub severity: Severity,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub source: IssueSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: u32,
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
    pub info: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub success: bool,
    pub score: u32,
    pub summary: ReviewSummary,
    pub issues: Vec<ReviewIssue>,
    pub ai_reviewed: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationMetrics {
    pub code_quality: f64,
    pub maintainability: f64,
    pub security: f64,
    pub performance: f64,
    pub best_practices: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationAnalysis {
    pub total_files: usize,
    pub total_lines: usize,
    pub avg_file_size: f64,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evaluator {
    Heuristic,
    Oumi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success: bool,
    pub overall_score: f64,
    pub metrics: EvaluationMetrics,
    pub analysis: EvaluationAnalysis,
    pub recommendations: Vec<String>,
    pub evaluator: Evaluator,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orchestrator {
    Direct,
    Kestra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_duration: String,
    pub files_generated: usize,
    pub issues_found: u32,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResults {
    pub decision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub execution_id: String,
    pub timestamp: String,
    pub orchestrator: Orchestrator,
    pub metrics: SummaryMetrics,
    pub results: SummaryResults,
}

/// Everything one pipeline run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub success: bool,
    pub generation: GenerationResult,
    pub review: ReviewResult,
    pub evaluation: EvaluationResult,
    pub summary: WorkflowSummary,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
