//! Remote proxy used by secondaries to reach the primary over HTTP

mod client;
mod policy;

pub use client::{RemoteClient, probe_health};
pub use policy::{FixedInterval, PollPolicy};
