//! Authentication adapters.

mod jwt;
mod mock;

pub use jwt::JwtAuthProvider;
pub use mock::MockAuthProvider;
