/// Storage collaborators
///
/// Session and identity records live behind traits so the token core can run
/// against Postgres in production and in-memory maps in tests.

mod identities;
mod sessions;
mod sweeper;

pub use identities::{Identity, IdentityStore, InMemoryIdentityStore, PgIdentityStore};
pub use sessions::{InMemorySessionStore, PgSessionStore, SessionStore};
pub use sweeper::{spawn_session_sweeper, sweep_expired_sessions};
