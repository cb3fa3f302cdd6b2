// Control-plane transport
//
// Every node owns one inbound reply endpoint on its sync port, serving all
// control-plane message types, and dials peers over short-lived outbound
// connections. Payloads are UTF-8 JSON dictionaries carrying an `action`
// field and, for inter-node messages, a `logicalTime` field.

pub mod frame;
pub mod message;
pub mod server;
pub mod transport;

pub use message::{SyncBody, SyncEnvelope, SyncReply};
pub use server::{SyncHandler, SyncServer};
pub use transport::SyncTransport;
