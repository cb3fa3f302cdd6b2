// Clocks
//
// Two clocks run on every node. The logical clock is a Lamport counter
// piggybacked on every control-plane message. The physical clock is the
// system wall clock plus a signed millisecond offset that Berkeley rounds
// adjust over time.

pub mod berkeley;
pub mod logical;
pub mod physical;

pub use berkeley::BerkeleySync;
pub use logical::LogicalClock;
pub use physical::PhysicalClock;
