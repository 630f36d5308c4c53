pub mod delivery;
pub mod executor;
pub mod function;
pub mod job_cache;
pub mod marker_store;

pub use delivery::*;
pub use executor::*;
pub use function::*;
pub use job_cache::*;
pub use marker_store::*;
