//! The `cmd` module: run external commands.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use caller_core::{BoundArgs, FunctionError, FunctionSignature, Invocable, InvocationOutcome};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmdFn {
    Run,
    Retcode,
}

pub struct CmdFunction {
    name: &'static str,
    kind: CmdFn,
    doc: &'static str,
    signature: FunctionSignature,
}

pub fn functions() -> Vec<Arc<dyn Invocable>> {
    let signature = FunctionSignature::new()
        .required("cmd")
        .optional("cwd", Value::Null)
        .optional("python_shell", json!(true));

    vec![
        Arc::new(CmdFunction {
            name: "cmd.run",
            kind: CmdFn::Run,
            doc: "Execute the passed command and return the output as a string. \
                  The command's exit status becomes the job retcode.\n\n    caller call cmd.run 'ls -l /var/log'",
            signature: signature.clone(),
        }),
        Arc::new(CmdFunction {
            name: "cmd.retcode",
            kind: CmdFn::Retcode,
            doc: "Execute a shell command and return the command's return code.\n\n    caller call cmd.retcode 'file /bin/bash'",
            signature,
        }),
    ]
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run `command`, through `sh -c` when `shell` is set, otherwise split on
/// whitespace and spawn the program directly.
pub async fn run_command(
    command: &str,
    cwd: Option<&str>,
    shell: bool,
) -> Result<CommandOutput, FunctionError> {
    let mut cmd = if shell {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    } else {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| FunctionError::InvalidArguments("cmd must not be empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd
    };
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    info!("Executing command: {}", command);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => FunctionError::CommandNotFound(format!("{command}: {e}")),
        _ => FunctionError::CommandExecution(format!("failed to start '{command}': {e}")),
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| FunctionError::CommandExecution("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| FunctionError::CommandExecution("stderr not captured".to_string()))?;

    let (stdout_lines, stderr_lines) = tokio::join!(read_lines(stdout), read_lines(stderr));

    let status = child
        .wait()
        .await
        .map_err(|e| FunctionError::CommandExecution(format!("waiting for '{command}': {e}")))?;

    // Killed by a signal: no exit code.
    let exit_code = status.code().unwrap_or(-1);
    debug!("Command '{}' exited with {}", command, exit_code);

    Ok(CommandOutput {
        stdout: stdout_lines.join("\n"),
        stderr: stderr_lines.join("\n"),
        exit_code,
    })
}

/// Drain `stream` to EOF, one line at a time. Bytes that are not UTF-8 are
/// replaced rather than ending the read.
async fn read_lines<R: AsyncRead + Unpin>(stream: R) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => lines.push(String::from_utf8_lossy(&buf).trim_end().to_string()),
            Err(e) => {
                warn!("Stopped reading command output: {}", e);
                break;
            }
        }
    }
    lines
}

#[async_trait]
impl Invocable for CmdFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn doc(&self) -> Option<&str> {
        Some(self.doc)
    }

    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn invoke(&self, args: &BoundArgs) -> Result<InvocationOutcome, FunctionError> {
        let command = match args.get("cmd") {
            Some(Value::String(command)) => command.clone(),
            Some(other) => other.to_string(),
            None => return Err(FunctionError::InvalidArguments("cmd is required".to_string())),
        };
        let shell = args
            .get("python_shell")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let output = run_command(&command, args.get_str("cwd"), shell).await?;

        let outcome = match self.kind {
            CmdFn::Run => {
                let mut text = output.stdout;
                if !output.stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&output.stderr);
                }
                InvocationOutcome::new(Value::String(text))
            }
            CmdFn::Retcode => InvocationOutcome::new(json!(output.exit_code)),
        };
        Ok(outcome.with_retcode(output.exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let output = run_command("echo hello && echo oops >&2", None, true)
            .await
            .unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "oops");
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_later_output() {
        let output = run_command(r"printf 'ok\n\377\nafter\n'", None, true)
            .await
            .unwrap();
        assert_eq!(output.stdout, "ok\n\u{FFFD}\nafter");
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_output_larger_than_pipe_buffer_is_drained() {
        let output = run_command(
            r"printf '\377\n'; i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done",
            None,
            true,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.lines().count(), 20001);
        assert!(output.stdout.ends_with("line19999"));
    }

    #[tokio::test]
    async fn test_run_command_exit_code() {
        let output = run_command("exit 3", None, true).await.unwrap();
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn test_missing_binary_is_command_not_found() {
        let err = run_command("definitely-not-a-real-binary-xyz --flag", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionError::CommandNotFound(_)));
    }

    #[tokio::test]
    async fn test_cmd_run_sets_retcode() {
        let function = functions().into_iter().find(|f| f.name() == "cmd.run").unwrap();
        let bound = function
            .signature()
            .bind(&[json!("echo out; exit 2")], &serde_json::Map::new())
            .unwrap();
        let outcome = function.invoke(&bound).await.unwrap();
        assert_eq!(outcome.value, json!("out"));
        assert_eq!(outcome.retcode, Some(2));
    }
}
