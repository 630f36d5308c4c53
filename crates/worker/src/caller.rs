//! End-to-end execution of a single job.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use caller_core::exit_codes::{EX_GENERIC, EX_USAGE};
use caller_core::{
    ErrorKind, ExecutionData, FunctionError, FunctionRegistry, Invocable, InvocationOutcome,
    JidGenerator, JobId, JobRequest, JobResult, MarkerStore,
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::delivery::{DeliveryReport, DeliveryRouter};
use crate::executors::ExecutorChain;

/// Lifecycle of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Admitted,
    Resolving,
    Executing,
    Classified,
    Delivered,
    Done,
    NotFoundExit,
    UsageErrorExit,
    FatalErrorExit,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Admitted => "ADMITTED",
            JobPhase::Resolving => "RESOLVING",
            JobPhase::Executing => "EXECUTING",
            JobPhase::Classified => "CLASSIFIED",
            JobPhase::Delivered => "DELIVERED",
            JobPhase::Done => "DONE",
            JobPhase::NotFoundExit => "NOT_FOUND_EXIT",
            JobPhase::UsageErrorExit => "USAGE_ERROR_EXIT",
            JobPhase::FatalErrorExit => "FATAL_ERROR_EXIT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Done
                | JobPhase::NotFoundExit
                | JobPhase::UsageErrorExit
                | JobPhase::FatalErrorExit
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFailure {
    CommandExecution,
    CommandNotFound,
}

impl From<ExecutionFailure> for ErrorKind {
    fn from(kind: ExecutionFailure) -> Self {
        match kind {
            ExecutionFailure::CommandExecution => ErrorKind::CommandExecution,
            ExecutionFailure::CommandNotFound => ErrorKind::CommandNotFound,
        }
    }
}

/// Reasons the caller could not run a function to completion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("'{fun}' is not available.{}", possible_reasons(.reason))]
    NotFound {
        fun: String,
        suggestions: BTreeMap<String, String>,
        reason: Option<String>,
    },

    #[error("Passed invalid arguments: {message}.{}", usage_block(.usage))]
    Usage {
        fun: String,
        message: String,
        usage: Option<String>,
    },

    #[error("{}", execution_message(.fun, .kind, .message))]
    Execution {
        fun: String,
        kind: ExecutionFailure,
        message: String,
    },
}

fn possible_reasons(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" Possible reasons: {reason}"),
        None => String::new(),
    }
}

fn usage_block(usage: &Option<String>) -> String {
    match usage {
        Some(doc) => format!("\nUsage:\n{doc}"),
        None => String::new(),
    }
}

fn execution_message(fun: &str, kind: &ExecutionFailure, message: &str) -> String {
    match kind {
        ExecutionFailure::CommandExecution => format!("Error running '{fun}': {message}"),
        ExecutionFailure::CommandNotFound => {
            format!("Command required for '{fun}' not found: {message}")
        }
    }
}

impl CallError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CallError::NotFound { .. } => EX_USAGE,
            CallError::Usage { .. } | CallError::Execution { .. } => EX_GENERIC,
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        match self {
            CallError::NotFound { .. } => ErrorKind::FunctionNotFound,
            CallError::Usage { .. } => ErrorKind::InvalidArguments,
            CallError::Execution { kind, .. } => (*kind).into(),
        }
    }

    /// Phase the job ended in.
    pub fn phase(&self) -> JobPhase {
        match self {
            CallError::NotFound { .. } => JobPhase::NotFoundExit,
            CallError::Usage { .. } => JobPhase::UsageErrorExit,
            CallError::Execution { .. } => JobPhase::FatalErrorExit,
        }
    }

    pub fn fun(&self) -> &str {
        match self {
            CallError::NotFound { fun, .. }
            | CallError::Usage { fun, .. }
            | CallError::Execution { fun, .. } => fun,
        }
    }

    /// Diagnostic record shown when verbose error output is enabled.
    pub fn detail(&self) -> Value {
        let mut detail = json!({
            "function": self.fun(),
            "error_kind": self.error_kind(),
            "phase": self.phase().as_str(),
            "exit_code": self.exit_code(),
        });
        let cause = match self {
            CallError::NotFound { reason, .. } => reason.clone(),
            CallError::Usage { message, .. } | CallError::Execution { message, .. } => {
                Some(message.clone())
            }
        };
        if let (Some(cause), Value::Object(map)) = (cause, &mut detail) {
            map.insert("cause".to_string(), Value::String(cause));
        }
        detail
    }
}

/// A finished job: the classified result, what delivery did with it and
/// the phases it went through.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: JobResult,
    pub delivery: DeliveryReport,
    pub phases: Vec<JobPhase>,
}

/// Per-node settings the caller needs at call time.
#[derive(Debug, Clone)]
pub struct CallerSettings {
    pub node_id: String,
    pub target: String,
    pub executor_opts: Option<Value>,
}

impl CallerSettings {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            target: "caller".to_string(),
            executor_opts: None,
        }
    }
}

pub struct Caller {
    registry: Arc<dyn FunctionRegistry>,
    chain: ExecutorChain,
    markers: Arc<dyn MarkerStore>,
    router: DeliveryRouter,
    jids: Arc<JidGenerator>,
    settings: CallerSettings,
    pid: u32,
}

impl Caller {
    pub fn new(
        registry: Arc<dyn FunctionRegistry>,
        chain: ExecutorChain,
        markers: Arc<dyn MarkerStore>,
        router: DeliveryRouter,
        settings: CallerSettings,
    ) -> Self {
        Self {
            registry,
            chain,
            markers,
            router,
            jids: Arc::new(JidGenerator::new()),
            settings,
            pid: std::process::id(),
        }
    }

    pub fn with_jid_generator(mut self, jids: Arc<JidGenerator>) -> Self {
        self.jids = jids;
        self
    }

    /// Run `fun` once. Caller-level failures come back as [`CallError`];
    /// a function that ran and reported failure is an `Ok` outcome with a
    /// non-zero retcode.
    pub async fn call(
        &self,
        fun: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        metadata: Option<Value>,
    ) -> Result<CallOutcome, CallError> {
        let mut phases = vec![JobPhase::Admitted];
        let jid = self.jids.generate();
        info!(jid = %jid, fun = %fun, "Job admitted");

        self.enter(&mut phases, JobPhase::Resolving, &jid);
        let function = match self.registry.resolve(fun) {
            Ok(function) => function,
            Err(missing) => {
                let err = CallError::NotFound {
                    fun: missing.name,
                    suggestions: missing.suggestions,
                    reason: missing.reason,
                };
                warn!(
                    jid = %jid,
                    fun = %fun,
                    error_kind = ?err.error_kind(),
                    "Function is not available"
                );
                self.enter(&mut phases, err.phase(), &jid);
                return Err(err);
            }
        };

        let request = JobRequest::new(
            jid.clone(),
            fun,
            args,
            kwargs,
            self.settings.target.clone(),
            metadata,
        );

        if let Err(e) = self
            .markers
            .create(&jid, self.pid, fun, request.target_selector(), request.metadata())
            .await
        {
            warn!(jid = %jid, "Could not write process marker: {}", e);
        }

        self.enter(&mut phases, JobPhase::Executing, &jid);
        let executed = self.execute(&request, Arc::clone(&function)).await;

        if let Err(e) = self.markers.delete(&jid).await {
            warn!(jid = %jid, "Could not remove process marker: {}", e);
        }

        let outcome = match executed {
            Ok(outcome) => outcome.unwrap_or_default(),
            Err(e) => {
                error!(jid = %jid, fun = %fun, error_kind = ?e.error_kind(), "{}", e);
                self.enter(&mut phases, e.phase(), &jid);
                return Err(e);
            }
        };

        let mut result = self.classify(&request, function.as_ref(), outcome);
        self.enter(&mut phases, JobPhase::Classified, &jid);

        if !self.router.is_local() || self.router.has_sinks() {
            attach_metadata(&mut result, &request, &self.settings.node_id);
        }

        let delivery = self.router.deliver(&result).await;
        self.enter(&mut phases, JobPhase::Delivered, &jid);
        self.enter(&mut phases, JobPhase::Done, &jid);

        Ok(CallOutcome {
            result,
            delivery,
            phases,
        })
    }

    async fn execute(
        &self,
        request: &JobRequest,
        function: Arc<dyn Invocable>,
    ) -> Result<Option<InvocationOutcome>, CallError> {
        let fun = request.function();
        let usage = || function.doc().map(str::to_string);

        let bound = function
            .signature()
            .bind(request.args(), request.kwargs())
            .map_err(|e| CallError::Usage {
                fun: fun.to_string(),
                message: e.to_string(),
                usage: usage(),
            })?;

        let data = ExecutionData {
            jid: request.id().clone(),
            fun: fun.to_string(),
            arg: request.args().to_vec(),
            kwargs: request.kwargs().clone(),
            executor_opts: self.settings.executor_opts.clone(),
        };

        self.chain
            .invoke(Arc::clone(&function), &bound, &data)
            .await
            .map_err(|e| match e {
                FunctionError::InvalidArguments(message) => CallError::Usage {
                    fun: fun.to_string(),
                    message,
                    usage: usage(),
                },
                FunctionError::CommandExecution(message) => CallError::Execution {
                    fun: fun.to_string(),
                    kind: ExecutionFailure::CommandExecution,
                    message,
                },
                FunctionError::CommandNotFound(message) => CallError::Execution {
                    fun: fun.to_string(),
                    kind: ExecutionFailure::CommandNotFound,
                    message,
                },
            })
    }

    fn classify(
        &self,
        request: &JobRequest,
        function: &dyn Invocable,
        outcome: InvocationOutcome,
    ) -> JobResult {
        let classification = classify(&outcome.value, outcome.retcode);

        let mut result = JobResult::new(request.id().clone());
        result.return_value = outcome.value;
        result.retcode = classification.retcode;
        result.success = classification.success;
        if !classification.success {
            result.error_kind = Some(ErrorKind::ReturnedFailure);
        }
        if let Some(format) = function.outputter() {
            result.output_format = format;
        }
        result
    }

    fn enter(&self, phases: &mut Vec<JobPhase>, phase: JobPhase, jid: &JobId) {
        debug!(jid = %jid, phase = %phase, "Job phase");
        phases.push(phase);
    }
}

fn attach_metadata(result: &mut JobResult, request: &JobRequest, node_id: &str) {
    result.id = Some(node_id.to_string());
    result.fun = Some(request.function().to_string());
    result.fun_args = Some(request.fun_args());
    result.tgt = Some(request.target_selector().to_string());
    result.metadata = request.metadata().cloned();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CallError::NotFound {
            fun: "vault.read".to_string(),
            suggestions: BTreeMap::new(),
            reason: Some("hvac is missing".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "'vault.read' is not available. Possible reasons: hvac is missing"
        );
        assert_eq!(err.exit_code(), EX_USAGE);
    }

    #[test]
    fn test_usage_message_includes_doc() {
        let err = CallError::Usage {
            fun: "test.echo".to_string(),
            message: "missing required argument: 'text'".to_string(),
            usage: Some("Return the string passed in.".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Passed invalid arguments: missing required argument: 'text'.\nUsage:\nReturn the string passed in."
        );
        assert_eq!(err.exit_code(), EX_GENERIC);
        assert_eq!(err.phase(), JobPhase::UsageErrorExit);
    }

    #[test]
    fn test_execution_messages() {
        let err = CallError::Execution {
            fun: "cmd.run".to_string(),
            kind: ExecutionFailure::CommandNotFound,
            message: "git: not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command required for 'cmd.run' not found: git: not found"
        );
        assert_eq!(err.error_kind(), ErrorKind::CommandNotFound);

        let err = CallError::Execution {
            fun: "test.exception".to_string(),
            kind: ExecutionFailure::CommandExecution,
            message: "Oh noes!".to_string(),
        };
        assert_eq!(err.to_string(), "Error running 'test.exception': Oh noes!");
    }

    #[test]
    fn test_detail_names_kind_phase_and_cause() {
        let err = CallError::Usage {
            fun: "test.echo".to_string(),
            message: "missing required argument: 'text'".to_string(),
            usage: None,
        };
        assert_eq!(
            err.detail(),
            serde_json::json!({
                "function": "test.echo",
                "error_kind": "invalid_arguments",
                "phase": "USAGE_ERROR_EXIT",
                "exit_code": EX_GENERIC,
                "cause": "missing required argument: 'text'",
            })
        );

        let err = CallError::NotFound {
            fun: "nope.nothing".to_string(),
            suggestions: BTreeMap::new(),
            reason: None,
        };
        assert_eq!(err.error_kind(), ErrorKind::FunctionNotFound);
        assert_eq!(err.detail()["exit_code"], serde_json::json!(EX_USAGE));
        assert!(err.detail().get("cause").is_none());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(JobPhase::Done.is_terminal());
        assert!(JobPhase::NotFoundExit.is_terminal());
        assert!(!JobPhase::Classified.is_terminal());
    }
}
