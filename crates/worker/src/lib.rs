pub mod args;
pub mod caller;
pub mod classifier;
pub mod delivery;
pub mod executors;
pub mod functions;

pub use args::{parse_input, ParsedArgs};
pub use caller::{CallError, CallOutcome, Caller, CallerSettings, ExecutionFailure, JobPhase};
pub use classifier::{classify, Classification};
pub use delivery::{DeliveryReport, DeliveryRouter, RemoteOutcome};
pub use executors::{
    DirectCallExecutor, ExecutorChain, ExecutorRegistry, IsolatedExecutor, SplayExecutor,
};
pub use functions::ModuleRegistry;
