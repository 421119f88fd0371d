//! Append-only evaluation archive.
//!
//! Every completed evaluation is appended exactly once, in evaluation
//! order, as a checksummed frame. The archive is the durable answer to
//! "how many candidates have been evaluated", which restart diagnosis
//! depends on.

mod framing;
mod record;
mod store;

pub use record::{EvaluationRecord, Rejection, StageResult};
pub use store::{ArchiveReader, ArchiveStore};
