pub mod channel;
pub mod job_cache;
pub mod marker_store;
pub mod process_probe;
pub mod sinks;

pub use channel::HttpReturnChannel;
pub use job_cache::{FileJobCache, RetentionPolicy};
pub use marker_store::FileMarkerStore;
pub use process_probe::SysinfoProcessProbe;
pub use sinks::{create_sink, JsonlSink, LocalSink};
