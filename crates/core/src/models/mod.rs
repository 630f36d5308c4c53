pub mod job;
pub mod marker;
pub mod result;
pub mod signature;

pub use job::{JobId, JobRequest, JID_TIMESTAMP_LEN};
pub use marker::ProcessMarker;
pub use result::{ErrorKind, JobResult, OutputFormat};
pub use signature::{BindError, BoundArgs, FunctionSignature, Param};
