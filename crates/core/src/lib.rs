pub mod config;
pub mod errors;
pub mod exit_codes;
pub mod jid;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{AppConfig, ConfigValidator};
pub use errors::*;
pub use jid::JidGenerator;
pub use models::{
    BindError, BoundArgs, ErrorKind, FunctionSignature, JobId, JobRequest, JobResult,
    OutputFormat, ProcessMarker,
};
pub use traits::{
    DeliverySink, ExecutionData, Executor, FunctionNotFound, FunctionRegistry, Invocable,
    InvocationOutcome, JobCache, MarkerStore, ProcessProbe, ProcessStatus, ReturnChannel,
};
