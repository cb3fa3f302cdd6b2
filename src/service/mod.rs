// Client-facing services
//
// Four services share one request-envelope discipline: a generic worker
// owns the socket, parses the action and routes to the handler that claims
// it. Handlers return reply dictionaries, never errors across the wire,
// and enqueue exactly one replication event per successful mutation.

pub mod dispatcher;
pub mod follows;
pub mod messages;
pub mod posts;
pub mod request;
pub mod users;

pub use dispatcher::{ActionHandler, ServiceWorker};
pub use follows::FollowHandler;
pub use messages::MessageHandler;
pub use posts::PostHandler;
pub use request::{action_port_offset, ClientRequest};
pub use users::UserHandler;
