//! Pipeline, orchestration and service endpoints over HTTP

mod common;

use common::TestServer;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 34}
    })
}

#[tokio::test]
async fn test_generate_without_keys_uses_templates() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server
        .post(
            "/api/generate",
            json!({"prompt": "Create a REST API for todos", "language": "typescript"}),
            None,
        )
        .await;

    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["generation"]["provider"], "Template");
    assert!(!body["generation"]["files"].as_array().unwrap().is_empty());
    assert!(body["review"]["score"].as_u64().unwrap() <= 100);
    assert_eq!(body["review"]["ai_reviewed"], false);
    assert_eq!(body["evaluation"]["evaluator"], "heuristic");
    assert_eq!(body["summary"]["orchestrator"], "Direct");
    assert_eq!(body["summary"]["workflow_id"], "devagent_workflow");
    assert!(body["summary"]["metrics"]["total_duration"]
        .as_str()
        .unwrap()
        .ends_with('s'));
}

#[tokio::test]
async fn test_generate_validation() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server
        .post("/api/generate", json!({"prompt": "   "}), None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Prompt is required");

    let (status, body) = server.get("/api/generate", None).await;
    assert_eq!(status, 405);
    assert_eq!(body["error"], "Method not allowed");

    let response = server
        .client
        .post(server.url("/api/generate"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_generate_falls_back_to_secondary_provider() {
    let providers = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/together/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&providers)
        .await;

    Mock::given(method("POST"))
        .and(path("/groq/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "```filename: app.py\ndef main():\n    try:\n        return 1\n    except ValueError:\n        return 0\n```",
        )))
        .mount(&providers)
        .await;

    let together_url = format!("{}/together", providers.uri());
    let groq_url = format!("{}/groq", providers.uri());
    let server = TestServer::start(&[
        "--together-api-url",
        together_url.as_str(),
        "--together-api-key",
        "together-key",
        "--groq-api-url",
        groq_url.as_str(),
        "--groq-api-key",
        "groq-key-long-enough",
    ])
    .await;

    let (status, body) = server
        .post(
            "/api/generate",
            json!({"prompt": "A python helper", "language": "python", "useKestra": false}),
            None,
        )
        .await;

    assert_eq!(status, 200, "{body}");
    assert_eq!(body["generation"]["provider"], "Groq");
    assert_eq!(body["generation"]["files"][0]["path"], "app.py");
    assert_eq!(body["generation"]["files"][0]["language"], "python");
    // The Groq key doubles as the review key
    assert_eq!(body["review"]["ai_reviewed"], true);
}

#[tokio::test]
async fn test_request_key_overrides_server_key() {
    let providers = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::header("authorization", "Bearer caller-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "```filename: index.js\nexport const answer = 42;\n```",
        )))
        .expect(1)
        .mount(&providers)
        .await;

    let uri = providers.uri();
    let server = TestServer::start(&[
        "--together-api-url",
        uri.as_str(),
        "--together-api-key",
        "server-key",
    ])
    .await;

    let (status, body) = server
        .post(
            "/api/generate",
            json!({"prompt": "export a constant", "language": "javascript", "apiKey": "caller-key"}),
            None,
        )
        .await;

    assert_eq!(status, 200, "{body}");
    assert_eq!(body["generation"]["provider"], "Together AI");
}

#[tokio::test]
async fn test_kestra_status() {
    let server = TestServer::start(&[]).await;
    let (status, body) = server.get("/api/kestra-status", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["available"], false);
    assert_eq!(body["message"], "Kestra unavailable, using direct AI execution");

    let kestra = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/flows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&kestra)
        .await;

    let uri = kestra.uri();
    let server = TestServer::start(&["--kestra-api-url", uri.as_str()]).await;
    let (status, body) = server.get("/api/kestra-status", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["available"], true);
    assert_eq!(body["url"], uri);
    assert_eq!(body["message"], "Kestra workflow orchestration is active");
}

#[tokio::test]
async fn test_kestra_webhook() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server
        .post("/api/kestra-webhook", json!({"workflow_id": "devagent_workflow"}), None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing required fields: workflow_id, execution_id");

    let (status, body) = server
        .post(
            "/api/kestra-webhook",
            json!({
                "workflow_id": "devagent_workflow",
                "execution_id": "exec-1",
                "status": "SUCCESS",
                "generation": {"files": []},
                "review": {"score": 90}
            }),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["execution_id"], "exec-1");
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["data"]["review"]["score"], 90);
    assert!(body["data"]["evaluation"].is_null());

    let (status, _) = server.get("/api/kestra-webhook", None).await;
    assert_eq!(status, 405);
}

#[tokio::test]
async fn test_health_version_and_fallbacks() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server.get("/health", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["mode"], "development");
    assert_eq!(body["store"]["backend"], "memory");

    let (status, body) = server.get("/version", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["service"], "devagent");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let (status, _) = server.get("/nope", None).await;
    assert_eq!(status, 404);

    let response = server
        .raw(reqwest::Method::OPTIONS, "/api/generate", None, None, None)
        .await;
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

/// Kestra fake that reports itself reachable
async fn kestra_server() -> MockServer {
    let kestra = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/flows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&kestra)
        .await;
    kestra
}

async fn mount_execution(kestra: &MockServer, id: &str, state: &str, outputs: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/executions/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "namespace": "devagent",
            "flowId": "devagent_workflow",
            "state": {"current": state},
            "outputs": outputs
        })))
        .mount(kestra)
        .await;
}

fn triggered(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": id,
        "namespace": "devagent",
        "flowId": "devagent_workflow",
        "state": {"current": "CREATED"}
    }))
}

fn kestra_flags(uri: &str, extra: &[&str]) -> Vec<String> {
    let mut flags: Vec<String> = [
        "--kestra-enabled",
        "--kestra-api-url",
        uri,
        "--kestra-poll-interval-ms",
        "50",
        "--kestra-timeout-secs",
        "5",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    flags.extend(extra.iter().map(|s| s.to_string()));
    flags
}

#[tokio::test]
async fn test_generate_through_kestra() {
    let kestra = kestra_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/executions/devagent/devagent_workflow"))
        .respond_with(triggered("exec-42"))
        .expect(1)
        .mount(&kestra)
        .await;
    mount_execution(
        &kestra,
        "exec-42",
        "SUCCESS",
        json!({
            "generation": {"files": [{"path": "main.py", "content": "print(1)"}], "provider": "Kestra flow"},
            "review": {"score": 88, "summary": {"total": 2}},
            "evaluation": {"overall_score": 91.0}
        }),
    )
    .await;

    let uri = kestra.uri();
    let flags = kestra_flags(&uri, &[]);
    let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
    let server = TestServer::start(&flags).await;

    let (status, body) = server
        .post("/api/generate", json!({"prompt": "hello world in python", "language": "python"}), None)
        .await;

    assert_eq!(status, 200, "{body}");
    assert_eq!(body["summary"]["orchestrator"], "Kestra");
    assert_eq!(body["summary"]["execution_id"], "exec-42");
    assert_eq!(body["summary"]["metrics"]["files_generated"], 1);
    assert_eq!(body["summary"]["metrics"]["issues_found"], 2);
    assert_eq!(body["generation"]["files"][0]["path"], "main.py");
    assert_eq!(body["review"]["score"], 88);
}

#[tokio::test]
async fn test_failed_kestra_run_falls_back_to_direct() {
    let kestra = kestra_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/executions/devagent/devagent_workflow"))
        .respond_with(triggered("exec-failed"))
        .expect(1)
        .mount(&kestra)
        .await;
    mount_execution(&kestra, "exec-failed", "FAILED", serde_json::Value::Null).await;

    let uri = kestra.uri();
    let flags = kestra_flags(&uri, &[]);
    let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
    let server = TestServer::start(&flags).await;

    let (status, body) = server
        .post("/api/generate", json!({"prompt": "A todo API", "language": "typescript"}), None)
        .await;

    assert_eq!(status, 200, "{body}");
    assert_eq!(body["summary"]["orchestrator"], "Direct");
    assert_eq!(body["generation"]["provider"], "Template");
}

#[tokio::test]
async fn test_webhook_results_feed_kestra_runs() {
    let kestra = kestra_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/executions/devagent/devagent_workflow"))
        .respond_with(triggered("exec-old"))
        .up_to_n_times(1)
        .mount(&kestra)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/executions/devagent/devagent_workflow"))
        .respond_with(triggered("exec-new"))
        .mount(&kestra)
        .await;
    mount_execution(&kestra, "exec-old", "SUCCESS", serde_json::Value::Null).await;
    mount_execution(&kestra, "exec-new", "SUCCESS", serde_json::Value::Null).await;

    let uri = kestra.uri();
    let flags = kestra_flags(
        &uri,
        &[
            "--kestra-webhook-secret",
            "hook-secret",
            "--kestra-webhook-max-results",
            "2",
        ],
    );
    let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
    let server = TestServer::start(&flags).await;

    let webhook = |id: &str| {
        json!({
            "workflow_id": "devagent_workflow",
            "execution_id": id,
            "status": "SUCCESS",
            "generation": {"files": [{"path": format!("{id}.py"), "content": "x = 1"}]},
            "review": {"score": 75}
        })
    };

    let (status, body) = server.post("/api/kestra-webhook", webhook("exec-old"), None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = server
        .post("/api/kestra-webhook", webhook("exec-old"), Some("wrong-secret"))
        .await;
    assert_eq!(status, 401);

    // Only two results are kept, so the first one is evicted
    for id in ["exec-old", "exec-mid", "exec-new"] {
        let (status, body) = server
            .post("/api/kestra-webhook", webhook(id), Some("hook-secret"))
            .await;
        assert_eq!(status, 200, "{body}");
    }

    let (status, body) = server
        .post("/api/generate", json!({"prompt": "first run", "language": "python"}), None)
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["summary"]["orchestrator"], "Direct");

    let (status, body) = server
        .post("/api/generate", json!({"prompt": "second run", "language": "python"}), None)
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["summary"]["orchestrator"], "Kestra");
    assert_eq!(body["summary"]["execution_id"], "exec-new");
    assert_eq!(body["generation"]["files"][0]["path"], "exec-new.py");
    assert_eq!(body["review"]["score"], 75);
}

#[tokio::test]
async fn test_signed_in_caller_stored_key_is_used() {
    let providers = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::header("authorization", "Bearer stored-together-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "```filename: src/index.ts\nexport const ready = true;\n```",
        )))
        .expect(1)
        .mount(&providers)
        .await;

    let uri = providers.uri();
    let server = TestServer::start(&["--together-api-url", uri.as_str()]).await;

    server
        .post(
            "/api/auth/signup",
            json!({"email": "lin@example.com", "password": "stored1"}),
            None,
        )
        .await;
    let (status, body) = server
        .post(
            "/api/auth/callback/credentials",
            json!({"email": "lin@example.com", "password": "stored1"}),
            None,
        )
        .await;
    assert_eq!(status, 200, "{body}");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = server
        .post(
            "/api/user/api-keys",
            json!({"togetherAI": "stored-together-key"}),
            Some(&token),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = server
        .post(
            "/api/generate",
            json!({"prompt": "export a flag", "language": "typescript"}),
            Some(&token),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["generation"]["provider"], "Together AI");
    assert_eq!(body["generation"]["files"][0]["path"], "src/index.ts");

    // Anonymous callers do not get the stored key
    let (status, body) = server
        .post(
            "/api/generate",
            json!({"prompt": "export a flag", "language": "typescript"}),
            None,
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["generation"]["provider"], "Template");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let server = TestServer::start(&[]).await;

    let prompt = "x".repeat(devagent::routes::MAX_BODY_BYTES + 1024);
    let response = server
        .raw(
            reqwest::Method::POST,
            "/api/generate",
            Some(json!({"prompt": prompt})),
            None,
            None,
        )
        .await;

    assert_eq!(response.status().as_u16(), 413);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Payload too large");
}
