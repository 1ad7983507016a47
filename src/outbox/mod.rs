//! The outbox: a durable local queue of downtime reports the collaborator
//! has not acknowledged yet.
//!
//! - **writer**: turns a submission into a record and persists it
//! - **drainer**: delivers records oldest first, deleting each on success and
//!   stopping at the first failure

pub mod drainer;
pub mod writer;

pub use drainer::{DrainOutcome, DrainReport, Drainer};
