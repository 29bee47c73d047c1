//! Usage: Server-side token exchange relay (keeps the GitHub client secret off the client).

mod errors;
mod exchange;
pub(crate) mod listen;
mod routes;
mod server;
mod token_exchange;

pub use server::{serve, RelayServer};
