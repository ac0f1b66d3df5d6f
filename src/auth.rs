//! Credential models, redacted secrets, and scoped auth sessions.

pub mod credentials;
pub mod secret;
pub mod session;

pub use credentials::*;
pub use secret::*;
pub use session::*;
