//! Request management on the primary
//!
//! RequestManager writes request records to the store and keeps the in-memory
//! correlation between a request id and the caller blocked on its answer.

mod handle;
mod requests;

pub use handle::{WaitHandle, WaitOutcome};
pub use requests::{RequestManager, validate_ask};
