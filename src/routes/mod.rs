mod auth;
mod health_check;

pub use auth::{authenticate, current_session, refresh, register};
pub use health_check::health_check;
