//! Append-only audit trail.
//!
//! Components emit [`AuditEvent`]s through a cloneable [`AuditHandle`]; a
//! single [`AuditWriter`] task drains the channel into an [`AuditStore`].
//! Emitting never fails or blocks the caller's own work.

mod events;
mod handle;
mod sqlite;
mod store;
mod timeline;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use timeline::*;
pub use writer::*;
