//! Code generation over the provider chain
//!
//! Backends are tried in order. A backend that errors or answers with nothing
//! is logged and skipped; when every backend fails the templates answer.

use std::sync::Arc;
use tracing::{info, warn};

use super::parse::parse_generated_code;
use super::templates::generate_template;
use super::types::{now_rfc3339, GenerateRequest, GenerationResult};
use crate::llm::{CompletionRequest, LlmBackend};

pub const TEMPLATE_PROVIDER: &str = "Template";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 4000;

/// System prompt for a language and optional framework
pub fn system_prompt(language: &str, framework: Option<&str>) -> String {
    let stack = match framework {
        Some(framework) => format!("{} with {}", language, framework),
        None => language.to_string(),
    };

    format!(
        "You are an expert software engineer specializing in {stack}.

Your task is to generate production-ready, well-structured code that follows best practices.

Requirements:
- Write clean, maintainable code
- Include proper error handling
- Add comments for complex logic
- Follow {language} conventions
- Structure code in multiple files if needed
- Include basic tests if applicable

Format your response as:
```filename: path/to/file.ext
[code content]
```

Repeat for each file needed."
    )
}

pub struct CodeGenerator {
    backends: Vec<Arc<dyn LlmBackend>>,
}

impl CodeGenerator {
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>) -> Self {
        Self { backends }
    }

    /// Providers in the order they are tried
    pub fn providers(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.provider()).collect()
    }

    pub async fn generate(&self, request: &GenerateRequest) -> GenerationResult {
        let language = request.language();
        let framework = request.framework();
        let prompt = request.prompt.trim();
        let system = system_prompt(&language, framework);

        for backend in &self.backends {
            let completion = CompletionRequest::user(prompt)
                .with_system(system.clone())
                .with_temperature(TEMPERATURE)
                .with_max_tokens(MAX_TOKENS);

            match backend.complete(completion).await {
                Ok(response) => {
                    let files = parse_generated_code(&response.content, &language);
                    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
                    let summary = format!(
                        "Generated {} file(s) using {}: {}",
                        files.len(),
                        backend.provider(),
                        paths.join(", ")
                    );
                    info!(
                        provider = %backend.provider(),
                        model = %backend.id(),
                        files = files.len(),
                        tokens = response.usage.total(),
                        "Code generated"
                    );
                    return GenerationResult {
                        success: true,
                        files,
                        summary,
                        provider: backend.provider().to_string(),
                        model: Some(backend.id().to_string()),
                        timestamp: now_rfc3339(),
                    };
                }
                Err(e) => {
                    warn!(provider = %backend.provider(), error = %e, "Provider failed, trying next");
                }
            }
        }

        let files = generate_template(prompt, &language, framework);
        info!(files = files.len(), "Generated code from templates");
        GenerationResult {
            success: true,
            summary: format!("Generated {} file(s) for: {}", files.len(), prompt),
            files,
            provider: TEMPLATE_PROVIDER.to_string(),
            model: None,
            timestamp: now_rfc3339(),
        }
    }
}
