//! Code review: static rules plus an optional AI pass
//!
//! Static rules are cheap pattern checks run per file, chosen by the file's
//! own language. Markdown and other prose files are not reviewed.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::types::{
    now_rfc3339, GeneratedFile, IssueSource, ReviewIssue, ReviewResult, ReviewSummary, Severity,
};
use crate::llm::{CompletionRequest, LlmBackend};

/// Lines longer than this are reported
pub const MAX_LINE_LENGTH: usize = 120;

static EMPTY_CATCH: OnceLock<Option<Regex>> = OnceLock::new();
static JSON_ARRAY: OnceLock<Option<Regex>> = OnceLock::new();

fn empty_catch_regex() -> Option<&'static Regex> {
    EMPTY_CATCH
        .get_or_init(|| Regex::new(r"catch\s*(\([^)]*\))?\s*\{\s*\}").ok())
        .as_ref()
}

fn json_array_regex() -> Option<&'static Regex> {
    JSON_ARRAY
        .get_or_init(|| Regex::new(r"\[[\s\S]*\]").ok())
        .as_ref()
}

/// Source languages; prose and config files are skipped by review and evaluation
pub fn is_reviewable(language: &str) -> bool {
    !matches!(
        language,
        "markdown" | "text" | "plaintext" | "json" | "yaml" | "toml"
    )
}

fn is_script(language: &str) -> bool {
    matches!(language, "typescript" | "javascript")
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.contains("test") || lower.contains("spec")
}

fn issue(
    file: &GeneratedFile,
    severity: Severity,
    line: Option<u32>,
    message: &str,
    suggestion: &str,
) -> ReviewIssue {
    ReviewIssue {
        severity,
        file: file.path.clone(),
        line,
        message: message.to_string(),
        suggestion: Some(suggestion.to_string()),
        source: IssueSource::Static,
    }
}

/// Run the static rules over one file
pub fn review_file(file: &GeneratedFile) -> Vec<ReviewIssue> {
    let language = file.language.as_str();
    if !is_reviewable(language) {
        return Vec::new();
    }

    let mut issues = Vec::new();
    let script = is_script(language);
    let python = language == "python";
    let test_file = is_test_path(&file.path);

    for (idx, line) in file.content.lines().enumerate() {
        let line_no = Some(idx as u32 + 1);
        let trimmed = line.trim_start();

        if line.contains("TODO") || line.contains("FIXME") {
            issues.push(issue(
                file,
                Severity::Minor,
                line_no,
                "TODO/FIXME comment found",
                "Resolve the pending work or track it in an issue",
            ));
        }

        if line.chars().count() > MAX_LINE_LENGTH {
            issues.push(issue(
                file,
                Severity::Info,
                line_no,
                "Line exceeds 120 characters",
                "Break the line up for readability",
            ));
        }

        if script {
            let comment = trimmed.starts_with("//") || trimmed.starts_with('*');

            if !comment && !test_file && line.contains("console.log") {
                issues.push(issue(
                    file,
                    Severity::Minor,
                    line_no,
                    "console.log statement found",
                    "Use a structured logger or remove debug output",
                ));
            }

            if line.contains(": any") {
                issues.push(issue(
                    file,
                    Severity::Major,
                    line_no,
                    "Avoid using the 'any' type",
                    "Declare a specific type or use 'unknown'",
                ));
            }

            if empty_catch_regex().is_some_and(|re| re.is_match(line)) {
                issues.push(issue(
                    file,
                    Severity::Critical,
                    line_no,
                    "Empty catch block swallows errors",
                    "Handle or rethrow the error",
                ));
            }
        }

        if python && !trimmed.starts_with('#') && line.contains("print(") {
            issues.push(issue(
                file,
                Severity::Info,
                line_no,
                "print statement found",
                "Use the logging module instead of print",
            ));
        }
    }

    let content = file.content.as_str();

    if script {
        if content.contains("async ") && !content.contains("try") && !content.contains("catch") {
            issues.push(issue(
                file,
                Severity::Major,
                None,
                "Async code without error handling",
                "Wrap awaited calls in try/catch",
            ));
        }

        if !content.contains("export") {
            issues.push(issue(
                file,
                Severity::Minor,
                None,
                "No exports found",
                "Export the module's public API",
            ));
        }
    }

    if python && content.contains("def ") && !content.contains("except") {
        issues.push(issue(
            file,
            Severity::Minor,
            None,
            "Functions without exception handling",
            "Handle expected failures with try/except",
        ));
    }

    if let Some(idx) = content.lines().position(|l| l.contains("eval(")) {
        issues.push(issue(
            file,
            Severity::Critical,
            Some(idx as u32 + 1),
            "Use of eval() is a security risk",
            "Parse input explicitly instead of evaluating it",
        ));
    }

    issues
}

/// Static review of every file
pub fn static_review(files: &[GeneratedFile]) -> Vec<ReviewIssue> {
    files.iter().flat_map(review_file).collect()
}

pub fn summarize(issues: &[ReviewIssue]) -> ReviewSummary {
    let mut summary = ReviewSummary {
        total: issues.len() as u32,
        ..Default::default()
    };
    for issue in issues {
        match issue.severity {
            Severity::Critical => summary.critical += 1,
            Severity::Major => summary.major += 1,
            Severity::Minor => summary.minor += 1,
            Severity::Info => summary.info += 1,
        }
    }
    summary
}

/// 100 minus weighted issue counts, floored at zero
pub fn score(summary: &ReviewSummary) -> u32 {
    let deductions = summary.critical * Severity::Critical.weight()
        + summary.major * Severity::Major.weight()
        + summary.minor * Severity::Minor.weight()
        + summary.info * Severity::Info.weight();
    100u32.saturating_sub(deductions)
}

/// Extract issues from a model's reply. Anything unparseable yields none.
pub fn parse_ai_issues(response: &str, path: &str) -> Vec<ReviewIssue> {
    let Some(matched) = json_array_regex().and_then(|re| re.find(response)) else {
        return Vec::new();
    };

    let values: Vec<serde_json::Value> = match serde_json::from_str(matched.as_str()) {
        Ok(values) => values,
        Err(e) => {
            debug!("AI review response was not a JSON array: {}", e);
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| {
            let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_string);
            let message = text("message").or_else(|| text("description"))?;
            Some(ReviewIssue {
                severity: text("severity")
                    .map(|s| Severity::parse_lenient(&s))
                    .unwrap_or(Severity::Info),
                file: path.to_string(),
                line: value
                    .get("line")
                    .and_then(|v| v.as_u64())
                    .and_then(|n| u32::try_from(n).ok()),
                message,
                suggestion: text("suggestion"),
                source: IssueSource::Ai,
            })
        })
        .collect()
}

const REVIEW_SYSTEM_PROMPT: &str = "You are an expert code reviewer. Analyze the code and identify:
1. Security vulnerabilities
2. Performance issues
3. Code quality problems
4. Best practice violations
5. Potential bugs

Respond only with a JSON array. Each element must have \"severity\" (critical, major, minor or info), \"line\" (number, if applicable), \"message\" and \"suggestion\". Respond with [] if there are no issues.";

/// Model-backed reviewer
pub struct AiReviewer {
    backend: Arc<dyn LlmBackend>,
}

impl AiReviewer {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Review one file. Provider failures are logged and yield no issues.
    pub async fn review_file(&self, file: &GeneratedFile, context: &str) -> Vec<ReviewIssue> {
        let mut system = REVIEW_SYSTEM_PROMPT.to_string();
        if !context.is_empty() {
            system.push_str(&format!("\n\nContext: {}", context));
        }

        let request = CompletionRequest::user(format!("File: {}\n\n{}", file.path, file.content))
            .with_system(system)
            .with_temperature(0.3)
            .with_max_tokens(2000);

        match self.backend.complete(request).await {
            Ok(response) => parse_ai_issues(&response.content, &file.path),
            Err(e) => {
                warn!(
                    provider = %self.backend.provider(),
                    file = %file.path,
                    error = %e,
                    "AI review failed, using static analysis only"
                );
                Vec::new()
            }
        }
    }
}

/// Full review stage: static rules, then the AI pass when a reviewer is set
pub async fn review(
    files: &[GeneratedFile],
    reviewer: Option<&AiReviewer>,
    context: &str,
) -> ReviewResult {
    let mut issues = static_review(files);

    let ai_reviewed = match reviewer {
        Some(reviewer) => {
            for file in files.iter().filter(|f| is_reviewable(&f.language)) {
                issues.extend(reviewer.review_file(file, context).await);
            }
            true
        }
        None => false,
    };

    let summary = summarize(&issues);
    let score = score(&summary);
    info!(
        issues = summary.total,
        critical = summary.critical,
        score,
        ai_reviewed,
        "Review completed"
    );

    ReviewResult {
        success: true,
        score,
        summary,
        issues,
        ai_reviewed,
        timestamp: now_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockBackend;

    fn ts(path: &str, content: &str) -> GeneratedFile {
        GeneratedFile {
            path: path.into(),
            content: content.into(),
            language: "typescript".into(),
        }
    }

    fn py(content: &str) -> GeneratedFile {
        GeneratedFile {
            path: "main.py".into(),
            content: content.into(),
            language: "python".into(),
        }
    }

    fn find<'a>(issues: &'a [ReviewIssue], message: &str) -> Option<&'a ReviewIssue> {
        issues.iter().find(|i| i.message.contains(message))
    }

    #[test]
    fn test_script_line_rules() {
        let file = ts(
            "src/app.ts",
            "export const x = 1;\nconsole.log(x);\n// console.log(x)\nfunction f(a: any) {}\ntry { f(1) } catch (e) {}\n",
        );
        let issues = review_file(&file);

        let log: Vec<_> = issues.iter().filter(|i| i.message.contains("console.log")).collect();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].line, Some(2));
        assert_eq!(log[0].severity, Severity::Minor);

        let any = find(&issues, "'any'").unwrap();
        assert_eq!((any.severity, any.line), (Severity::Major, Some(4)));

        let catch = find(&issues, "Empty catch").unwrap();
        assert_eq!((catch.severity, catch.line), (Severity::Critical, Some(5)));
    }

    #[test]
    fn test_console_log_allowed_in_tests() {
        let issues = review_file(&ts("src/app.test.ts", "export {};\nconsole.log('x');"));
        assert!(find(&issues, "console.log").is_none());
    }

    #[test]
    fn test_script_file_rules() {
        let issues = review_file(&ts("a.ts", "async function load() { await fetch('/x'); }"));
        assert_eq!(find(&issues, "Async code").unwrap().severity, Severity::Major);
        assert_eq!(find(&issues, "No exports").unwrap().severity, Severity::Minor);
        assert!(find(&issues, "No exports").unwrap().line.is_none());
    }

    #[test]
    fn test_python_rules() {
        let issues = review_file(&py("def main():\n    # print(debug)\n    print('hi')\n"));
        let prints: Vec<_> = issues.iter().filter(|i| i.message.contains("print")).collect();
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].line, Some(3));
        assert_eq!(prints[0].severity, Severity::Info);
        assert!(find(&issues, "without exception handling").is_some());

        let guarded = review_file(&py("def main():\n    try:\n        run()\n    except ValueError:\n        raise\n"));
        assert!(guarded.is_empty());
    }

    #[test]
    fn test_shared_rules_and_markdown_skip() {
        let long = "x".repeat(121);
        let file = ts("a.ts", &format!("export const a = eval('1');\n// TODO later\n{}", long));
        let issues = review_file(&file);
        assert_eq!(find(&issues, "eval").unwrap().line, Some(1));
        assert_eq!(find(&issues, "TODO").unwrap().line, Some(2));
        assert_eq!(find(&issues, "120").unwrap().line, Some(3));

        let readme = GeneratedFile {
            path: "README.md".into(),
            content: "TODO: console.log eval(".into(),
            language: "markdown".into(),
        };
        assert!(review_file(&readme).is_empty());
    }

    #[test]
    fn test_score_formula() {
        let summary = ReviewSummary {
            total: 7,
            critical: 1,
            major: 2,
            minor: 3,
            info: 1,
        };
        assert_eq!(score(&summary), 100 - (20 + 20 + 15 + 1));

        let heavy = ReviewSummary {
            total: 6,
            critical: 6,
            ..Default::default()
        };
        assert_eq!(score(&heavy), 0);
        assert_eq!(score(&ReviewSummary::default()), 100);
    }

    #[test]
    fn test_parse_ai_issues() {
        let response = r#"Sure, here are the findings:
[
  {"severity": "critical", "line": 3, "message": "SQL injection", "suggestion": "Use parameters"},
  {"severity": "weird", "description": "Naming"},
  {"line": 9}
]
Hope this helps."#;
        let issues = parse_ai_issues(response, "src/db.ts");
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].line, Some(3));
        assert_eq!(issues[0].source, IssueSource::Ai);
        assert_eq!(issues[1].severity, Severity::Info);
        assert_eq!(issues[1].message, "Naming");

        assert!(parse_ai_issues("no json here", "a").is_empty());
        assert!(parse_ai_issues("[not json]", "a").is_empty());
    }

    #[tokio::test]
    async fn test_review_with_ai_pass() {
        let backend = Arc::new(
            MockBackend::new("Groq")
                .with_response(r#"[{"severity":"major","line":1,"message":"Magic number"}]"#),
        );
        let reviewer = AiReviewer::new(backend.clone());
        let files = vec![
            ts("a.ts", "export const a = 42;"),
            GeneratedFile {
                path: "README.md".into(),
                content: "# readme".into(),
                language: "markdown".into(),
            },
        ];

        let result = review(&files, Some(&reviewer), "a constant").await;
        assert!(result.ai_reviewed);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(result.summary.major, 1);
        assert_eq!(result.score, 90);

        let request = backend.last_request().unwrap();
        assert!(request.system_prompt.unwrap().contains("Context: a constant"));
        assert_eq!(request.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_review_survives_reviewer_failure() {
        let backend = Arc::new(MockBackend::new("Groq").with_available(false));
        let reviewer = AiReviewer::new(backend);
        let result = review(&[ts("a.ts", "export const a = 1;")], Some(&reviewer), "").await;
        assert!(result.success);
        assert_eq!(result.score, 100);
    }
}
