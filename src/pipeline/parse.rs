//! Splitting a model response into files
//!
//! Models are asked to answer with fenced blocks whose info string is
//! `filename: path/to/file.ext`. The `filename:` prefix is optional.

use regex::Regex;
use std::sync::OnceLock;

use super::types::GeneratedFile;

static CODE_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

fn code_block_regex() -> Option<&'static Regex> {
    CODE_BLOCK
        .get_or_init(|| Regex::new(r"```(?:filename:\s*)?([^\n]+)\n([\s\S]*?)```").ok())
        .as_ref()
}

/// Language for a file path, falling back to `default_language`
pub fn language_for_path(path: &str, default_language: &str) -> String {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" | "cc" | "hpp" => "cpp",
        "c" | "h" => "c",
        "md" => "markdown",
        _ => default_language,
    }
    .to_string()
}

/// File extension (with dot) for a language
pub fn extension_for_language(language: &str) -> &'static str {
    match language {
        "typescript" => ".ts",
        "javascript" => ".js",
        "python" => ".py",
        "java" => ".java",
        "go" => ".go",
        "rust" => ".rs",
        "cpp" => ".cpp",
        "c" => ".c",
        _ => ".txt",
    }
}

/// Extract every fenced block as a file. A response with no blocks becomes a
/// single `main<ext>` file holding the whole text.
pub fn parse_generated_code(response: &str, language: &str) -> Vec<GeneratedFile> {
    let mut files: Vec<GeneratedFile> = code_block_regex()
        .map(|re| {
            re.captures_iter(response)
                .filter_map(|caps| {
                    let path = caps.get(1)?.as_str().trim().to_string();
                    let content = caps.get(2)?.as_str().trim().to_string();
                    if path.is_empty() {
                        return None;
                    }
                    let language = language_for_path(&path, language);
                    Some(GeneratedFile {
                        path,
                        content,
                        language,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if files.is_empty() {
        files.push(GeneratedFile {
            path: format!("main{}", extension_for_language(language)),
            content: response.trim().to_string(),
            language: language.to_string(),
        });
    }

    files
}
