use std::path::Path;

use caller::output::render_result;
use caller::{Application, CallRequest};
use caller_core::exit_codes::{exit_status, EX_GENERIC, EX_USAGE};
use caller_core::{AppConfig, OutputFormat};
use caller_worker::{CallError, RemoteOutcome};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn config_for(dir: &Path, extra: &str) -> AppConfig {
    let toml = format!(
        r#"
[caller]
id = "e2e-node"
cachedir = "{}"
cache_jobs = true

{extra}
"#,
        dir.display()
    );
    AppConfig::from_toml(&toml).unwrap()
}

fn call(fun: &str, tokens: &[&str]) -> CallRequest {
    CallRequest {
        fun: fun.to_string(),
        tokens: tokens.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// Accepts one HTTP request and yields its body.
async fn controller() -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .to_lowercase()
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:").map(|v| v.trim().to_string()))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length {
                    break;
                }
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&buf).to_string();
        text.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
    });

    (format!("http://{addr}/return"), handle)
}

#[tokio::test]
async fn test_local_ping_caches_and_renders() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path(), "");
    config.caller.local = true;
    let app = Application::new(config).unwrap();

    let outcome = app.call(call("test.ping", &[])).await.unwrap();
    assert_eq!(outcome.result.retcode, 0);
    assert!(outcome.result.success);
    assert_eq!(outcome.delivery.cached, Some(true));

    let cached = app.job(outcome.result.jid.as_str()).await.unwrap().unwrap();
    assert_eq!(cached.return_value, json!(true));
    assert!(dir
        .path()
        .join("jobs")
        .join(outcome.result.jid.as_str())
        .join("return.json")
        .is_file());

    assert_eq!(
        render_result(&outcome.result, None, false),
        "local:\n    True\n"
    );
    assert!(app.running().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_mode_returns_to_controller() {
    let dir = TempDir::new().unwrap();
    let (url, server) = controller().await;
    let config = config_for(dir.path(), &format!("[master]\nurl = \"{url}\"\ntimeout_seconds = 5\n"));
    let app = Application::new(config).unwrap();

    let outcome = app
        .call(call("test.echo", &["hello world"]))
        .await
        .unwrap();
    assert_eq!(outcome.delivery.remote, RemoteOutcome::Sent);
    assert_eq!(outcome.delivery.cached, None);

    let body: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(body["cmd"], json!("_return"));
    assert_eq!(body["id"], json!("e2e-node"));
    assert_eq!(body["jid"], json!("req"));
    assert_eq!(body["fun"], json!("test.echo"));
    assert_eq!(body["fun_args"], json!(["hello world"]));
    assert_eq!(body["return"], json!("hello world"));

    // Remote mode never touches the local job cache.
    assert!(app.jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_controller_keeps_job_successful() {
    let dir = TempDir::new().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = config_for(
        dir.path(),
        &format!("[master]\nurl = \"http://{addr}/return\"\ntimeout_seconds = 2\n"),
    );
    let app = Application::new(config).unwrap();

    let outcome = app.call(call("test.ping", &[])).await.unwrap();
    assert!(outcome.result.success);
    assert_eq!(outcome.delivery.remote, RemoteOutcome::Failed);
    assert_eq!(exit_status(outcome.result.retcode, false), 0);
}

#[tokio::test]
async fn test_jsonl_sink_receives_result_with_metadata() {
    let dir = TempDir::new().unwrap();
    let sink_path = dir.path().join("returns.jsonl");
    let extra = format!(
        "[returners]\nnames = [\"jsonl\", \"missing\"]\njsonl_path = \"{}\"\n",
        sink_path.display()
    );
    let mut config = config_for(dir.path(), &extra);
    config.caller.local = true;
    let app = Application::new(config).unwrap();

    let mut request = call("test.kwarg", &["name=web", "port=8080"]);
    request.no_parse = vec!["port".to_string()];
    request.metadata = Some(json!({"ticket": "OPS-42"}));

    let outcome = app.call(request).await.unwrap();
    assert_eq!(outcome.delivery.sinks_delivered, vec!["jsonl".to_string()]);
    assert_eq!(outcome.delivery.sinks_failed, vec!["missing".to_string()]);
    assert!(outcome.result.success);

    let line = std::fs::read_to_string(&sink_path).unwrap();
    let delivered: Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(delivered["return"], json!({"name": "web", "port": "8080"}));
    assert_eq!(delivered["fun"], json!("test.kwarg"));
    assert_eq!(delivered["id"], json!("e2e-node"));
    assert_eq!(delivered["metadata"], json!({"ticket": "OPS-42"}));
}

#[tokio::test]
async fn test_error_paths_map_to_exit_codes() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path(), "");
    config.caller.local = true;
    let app = Application::new(config).unwrap();

    let err = app.call(call("nonexistent.function", &[])).await.unwrap_err();
    assert_eq!(err.exit_code(), EX_USAGE);
    assert_eq!(err.to_string(), "'nonexistent.function' is not available.");

    let err = app.call(call("test.echo", &[])).await.unwrap_err();
    assert!(matches!(err, CallError::Usage { .. }));
    assert_eq!(err.exit_code(), EX_GENERIC);

    let err = app
        .call(call("cmd.run", &["definitely-not-a-binary-xyz", "python_shell=false"]))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Command required for 'cmd.run' not found:"));

    // None of the failed calls left a marker or a cached job behind.
    assert!(app.running().await.unwrap().is_empty());
    assert!(app.jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retcode_passthrough() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path(), "");
    config.caller.local = true;
    let app = Application::new(config).unwrap();

    let outcome = app.call(call("test.retcode", &["7"])).await.unwrap();
    assert_eq!(outcome.result.retcode, 7);
    assert_eq!(exit_status(outcome.result.retcode, true), 7);
    assert_eq!(exit_status(outcome.result.retcode, false), EX_GENERIC);
}

#[tokio::test]
async fn test_running_prunes_crashed_job_marker() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path(), "");
    config.caller.local = true;
    let app = Application::new(config).unwrap();

    let proc_dir = dir.path().join("proc");
    std::fs::create_dir_all(&proc_dir).unwrap();
    let orphan = proc_dir.join("20240101000000000001");
    std::fs::write(
        &orphan,
        json!({
            "jid": "20240101000000000001",
            "pid": 999_999_999u32,
            "fun": "test.sleep",
            "tgt": "caller",
            "created_at": "2024-01-01T00:00:00Z"
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(proc_dir.join("20240101000000000002"), b"").unwrap();

    assert!(app.running().await.unwrap().is_empty());
    assert!(!orphan.exists());
    assert!(!proc_dir.join("20240101000000000002").exists());
}

#[test]
fn test_outputter_override() {
    let mut result = caller_core::JobResult::new(caller_core::JobId::new("20240101000000000001"));
    result.return_value = json!({"a": 1});
    let out = render_result(&result, Some(OutputFormat::Json), false);
    assert_eq!(
        serde_json::from_str::<Value>(&out).unwrap(),
        json!({"local": {"a": 1}})
    );
}
