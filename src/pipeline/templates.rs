//! Deterministic templates, the last link of the provider chain
//!
//! Used when no LLM key is configured or every provider failed. The prompt
//! is scanned for a few keywords to pick a plausible project shape.

use super::parse::extension_for_language;
use super::types::GeneratedFile;

/// Keyword flags detected in a prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptTraits {
    pub api: bool,
    pub auth: bool,
    pub database: bool,
}

impl PromptTraits {
    pub fn detect(prompt: &str) -> Self {
        let p = prompt.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| p.contains(w));
        Self {
            api: any(&["api", "rest", "endpoint"]),
            auth: any(&["auth", "login", "user"]),
            database: any(&["database", "db", "crud"]),
        }
    }
}

const EXPRESS_APP: &str = r#"import express, { Application, NextFunction, Request, Response } from 'express';
import cors from 'cors';
import helmet from 'helmet';
{{imports}}
const app: Application = express();
const PORT = process.env.PORT || 3000;

app.use(helmet());
app.use(cors());
app.use(express.json());

app.get('/health', (_req: Request, res: Response) => {
  res.json({ status: 'healthy', timestamp: new Date().toISOString() });
});
{{mounts}}
app.use((err: Error, _req: Request, res: Response, _next: NextFunction) => {
  res.status(500).json({ error: err.message || 'Internal server error' });
});

app.listen(PORT);

export default app;"#;

const EXPRESS_AUTH_ROUTES: &str = r#"import { Router, Request, Response } from 'express';

const router = Router();

interface Credentials {
  email: string;
  password: string;
}

router.post('/login', async (req: Request, res: Response) => {
  try {
    const { email, password } = req.body as Credentials;
    if (!email || !password) {
      return res.status(400).json({ error: 'Email and password required' });
    }
    // TODO: verify credentials against the user store
    return res.json({ success: true, token: `session-${Date.now()}`, user: { email } });
  } catch (error) {
    return res.status(500).json({ error: 'Login failed' });
  }
});

router.post('/register', async (req: Request, res: Response) => {
  try {
    const { email, password } = req.body as Credentials;
    if (!email || !password) {
      return res.status(400).json({ error: 'Email and password required' });
    }
    // TODO: persist the new user
    return res.status(201).json({ success: true, message: 'User registered successfully' });
  } catch (error) {
    return res.status(500).json({ error: 'Registration failed' });
  }
});

export default router;"#;

const FASTAPI_APP: &str = r#"from typing import List, Optional

import uvicorn
from fastapi import FastAPI, HTTPException
from pydantic import BaseModel

app = FastAPI(title="Generated API", version="1.0.0")
{{models}}

@app.get("/")
async def root():
    return {"message": "Welcome to the generated API", "status": "healthy"}


@app.get("/health")
async def health_check():
    return {"status": "healthy"}
{{routes}}

if __name__ == "__main__":
    try:
        uvicorn.run(app, host="0.0.0.0", port=8000)
    except KeyboardInterrupt:
        pass"#;

const FASTAPI_TASK_MODELS: &str = r#"

class Task(BaseModel):
    id: Optional[int] = None
    title: str
    description: Optional[str] = None
    completed: bool = False


tasks_db: List[Task] = []
next_task_id = 1
"#;

const FASTAPI_TASK_ROUTES: &str = r#"

@app.get("/tasks", response_model=List[Task])
async def list_tasks():
    return tasks_db


@app.post("/tasks", response_model=Task)
async def create_task(task: Task):
    global next_task_id
    task.id = next_task_id
    next_task_id += 1
    tasks_db.append(task)
    return task


@app.get("/tasks/{task_id}", response_model=Task)
async def get_task(task_id: int):
    for task in tasks_db:
        if task.id == task_id:
            return task
    raise HTTPException(status_code=404, detail="Task not found")


@app.put("/tasks/{task_id}", response_model=Task)
async def update_task(task_id: int, updated: Task):
    for i, task in enumerate(tasks_db):
        if task.id == task_id:
            updated.id = task_id
            tasks_db[i] = updated
            return updated
    raise HTTPException(status_code=404, detail="Task not found")


@app.delete("/tasks/{task_id}")
async def delete_task(task_id: int):
    for i, task in enumerate(tasks_db):
        if task.id == task_id:
            tasks_db.pop(i)
            return {"message": "Task deleted successfully"}
    raise HTTPException(status_code=404, detail="Task not found")
"#;

const PYTHON_MODULE: &str = r#""""
{{prompt}}

Generated Python module.
"""


def main() -> None:
    """Entry point."""
    # TODO: implement the requested behaviour
    pass


if __name__ == "__main__":
    main()"#;

const SCRIPT_MODULE: &str = r#"/**
 * {{prompt}}
 *
 * Generated {{language}} module.
 */

export function main(): void {
  // TODO: implement the requested behaviour
}

main();"#;

fn file(path: impl Into<String>, content: impl Into<String>, language: &str) -> GeneratedFile {
    GeneratedFile {
        path: path.into(),
        content: content.into(),
        language: language.to_string(),
    }
}

fn express_app(traits: PromptTraits, ext: &str, language: &str) -> Vec<GeneratedFile> {
    let mut imports = String::new();
    let mut mounts = String::new();
    if traits.auth {
        imports.push_str("import authRouter from './routes/auth';\n");
        mounts.push_str("\napp.use('/api/auth', authRouter);\n");
    }
    if traits.database {
        imports.push_str("import taskRouter from './routes/tasks';\n");
        mounts.push_str("\napp.use('/api/tasks', taskRouter);\n");
    }

    let app = EXPRESS_APP
        .replace("{{imports}}", &imports)
        .replace("{{mounts}}", &mounts);

    let mut files = vec![file(format!("src/app{}", ext), app, language)];
    if traits.auth {
        files.push(file(format!("src/routes/auth{}", ext), EXPRESS_AUTH_ROUTES, language));
    }
    files
}

fn fastapi_app(traits: PromptTraits) -> GeneratedFile {
    let (models, routes) = if traits.database {
        (FASTAPI_TASK_MODELS, FASTAPI_TASK_ROUTES)
    } else {
        ("", "")
    };
    let content = FASTAPI_APP
        .replace("{{models}}", models)
        .replace("{{routes}}", routes);
    file("main.py", content, "python")
}

fn generic_module(prompt: &str, language: &str, ext: &str) -> GeneratedFile {
    let content = if language == "python" {
        PYTHON_MODULE.replace("{{prompt}}", prompt)
    } else {
        SCRIPT_MODULE
            .replace("{{prompt}}", prompt)
            .replace("{{language}}", language)
    };
    file(format!("src/main{}", ext), content, language)
}

fn readme(prompt: &str, language: &str, framework: Option<&str>, files: &[GeneratedFile]) -> GeneratedFile {
    let mut content = format!(
        "# Generated Code\n\n**Prompt**: {}\n\n**Language**: {}\n",
        prompt, language
    );
    if let Some(framework) = framework {
        content.push_str(&format!("**Framework**: {}\n", framework));
    }
    content.push_str(&format!("\n**Generated**: {}\n\n## Files\n\n", chrono::Utc::now().to_rfc3339()));
    for f in files {
        content.push_str(&format!("- `{}`\n", f.path));
    }
    content.push_str(
        "\n## Getting Started\n\n1. Install dependencies\n2. Review the generated code\n3. Run the project\n",
    );
    file("README.md", content, "markdown")
}

/// Produce a template project for the prompt. Always includes a README.
pub fn generate_template(prompt: &str, language: &str, framework: Option<&str>) -> Vec<GeneratedFile> {
    let traits = PromptTraits::detect(prompt);
    let ext = extension_for_language(language);

    let mut files = match language {
        "typescript" if traits.api => express_app(traits, ext, language),
        "python" if traits.api => vec![fastapi_app(traits)],
        _ => vec![generic_module(prompt, language, ext)],
    };

    let readme = readme(prompt, language, framework, &files);
    files.push(readme);
    files
}
