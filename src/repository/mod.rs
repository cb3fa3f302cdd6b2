// Entity repositories
//
// Keyed CRUD over the four entity kinds. Each repository owns one lock and
// one snapshot file; persistence happens inside the lock so concurrent
// mutations cannot interleave their writes.

pub mod messages;
pub mod posts;
mod store;
pub mod users;

pub use messages::{Message, MessageRepository};
pub use posts::{Post, PostRepository};
pub use users::{User, UserRepository};
