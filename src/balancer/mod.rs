// Front-door load balancer
//
// Terminates client connections, picks a live backend round-robin, forwards
// the untouched payload to the service port selected by the request's
// action, and relays the reply. A reduced sync responder keeps the routing
// table current from announcements and pings; election and clock-sync
// traffic is acknowledged but ignored.

pub mod registry;
pub mod responder;
pub mod router;

pub use registry::BackendRegistry;
pub use responder::BalancerSyncHandler;
pub use router::RequestRouter;
