// Asynchronous write replication
//
// Every successful local mutation produces one event, queued in FIFO order
// and fanned out to every live data peer. Delivery is at-least-once and
// best-effort; the applier makes every event type idempotent so repeats are
// harmless.

pub mod applier;
pub mod event;
pub mod queue;

pub use applier::ReplicationApplier;
pub use event::{EventType, ReplicationEvent};
pub use queue::ReplicationQueue;
