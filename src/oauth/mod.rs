//! Usage: Client side of the GitHub PKCE login (start, callback, session).

pub mod authorize;
pub mod callback;
pub mod pkce;
pub mod relay_client;
pub mod session;
