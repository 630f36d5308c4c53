//! The `test` module: functions for checking that the caller works.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caller_core::{
    BoundArgs, FunctionError, FunctionSignature, Invocable, InvocationOutcome, OutputFormat,
};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestFn {
    Ping,
    Echo,
    Arg,
    Kwarg,
    Retcode,
    Exception,
    False,
    Sleep,
    Outputter,
}

pub struct TestFunction {
    name: String,
    kind: TestFn,
    doc: &'static str,
    signature: FunctionSignature,
}

impl TestFunction {
    fn new(kind: TestFn, short: &str, doc: &'static str, signature: FunctionSignature) -> Self {
        Self {
            name: format!("test.{short}"),
            kind,
            doc,
            signature,
        }
    }
}

pub fn functions() -> Vec<Arc<dyn Invocable>> {
    vec![
        Arc::new(TestFunction::new(
            TestFn::Ping,
            "ping",
            "Just used to make sure the node is up and responsive. Returns True.\n\n    caller call test.ping",
            FunctionSignature::new(),
        )),
        Arc::new(TestFunction::new(
            TestFn::Echo,
            "echo",
            "Return the string passed in.\n\n    caller call test.echo 'foo bar baz'",
            FunctionSignature::new().required("text"),
        )),
        Arc::new(TestFunction::new(
            TestFn::Arg,
            "arg",
            "Print out the data passed into the function as positional and keyword arguments.\n\n    caller call test.arg 1 \"two\" 3.1 txt=hello",
            FunctionSignature::new().with_varargs().with_kwargs(),
        )),
        Arc::new(TestFunction::new(
            TestFn::Kwarg,
            "kwarg",
            "Return the keyword arguments passed in.\n\n    caller call test.kwarg num=1 txt=two",
            FunctionSignature::new().with_kwargs(),
        )),
        Arc::new(TestFunction::new(
            TestFn::Retcode,
            "retcode",
            "Return True and set the job retcode to the given value.\n\n    caller call test.retcode 42",
            FunctionSignature::new().optional("code", json!(42)),
        )),
        Arc::new(TestFunction::new(
            TestFn::Exception,
            "exception",
            "Raise a command execution error with the given message.\n\n    caller call test.exception 'Oh noes!'",
            FunctionSignature::new().optional("message", json!("Test Exception")),
        )),
        Arc::new(TestFunction::new(
            TestFn::False,
            "false",
            "Always return False.\n\n    caller call test.false",
            FunctionSignature::new(),
        )),
        Arc::new(TestFunction::new(
            TestFn::Sleep,
            "sleep",
            "Sleep for the given number of seconds, then return True.\n\n    caller call test.sleep 20",
            FunctionSignature::new().optional("length", json!(1)),
        )),
        Arc::new(TestFunction::new(
            TestFn::Outputter,
            "outputter",
            "Return the data passed in, rendered as plain text.\n\n    caller call test.outputter foobar",
            FunctionSignature::new().required("data"),
        )),
    ]
}

#[async_trait]
impl Invocable for TestFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn doc(&self) -> Option<&str> {
        Some(self.doc)
    }

    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn outputter(&self) -> Option<OutputFormat> {
        match self.kind {
            TestFn::Outputter => Some(OutputFormat::Txt),
            _ => None,
        }
    }

    async fn invoke(&self, args: &BoundArgs) -> Result<InvocationOutcome, FunctionError> {
        let value = match self.kind {
            TestFn::Ping => Value::Bool(true),
            TestFn::False => Value::Bool(false),
            TestFn::Echo => args.get("text").cloned().unwrap_or(Value::Null),
            TestFn::Outputter => args.get("data").cloned().unwrap_or(Value::Null),
            TestFn::Arg => json!({
                "args": args.extra_args(),
                "kwargs": args.extra_kwargs(),
            }),
            TestFn::Kwarg => Value::Object(args.extra_kwargs().clone()),
            TestFn::Retcode => {
                let code = args.get_i64("code").ok_or_else(|| {
                    FunctionError::InvalidArguments("code must be an integer".to_string())
                })?;
                let code = i32::try_from(code).map_err(|_| {
                    FunctionError::InvalidArguments(format!("code {code} is out of range"))
                })?;
                return Ok(InvocationOutcome::new(Value::Bool(true)).with_retcode(code));
            }
            TestFn::Exception => {
                let message = match args.get("message") {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => "Test Exception".to_string(),
                };
                return Err(FunctionError::CommandExecution(message));
            }
            TestFn::Sleep => {
                let length = args
                    .get_f64("length")
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .ok_or_else(|| {
                        FunctionError::InvalidArguments(
                            "length must be a non-negative number".to_string(),
                        )
                    })?;
                tokio::time::sleep(Duration::from_secs_f64(length)).await;
                Value::Bool(true)
            }
        };
        Ok(InvocationOutcome::new(value))
    }
}
