//! GitHub OAuth 2.0 authorization code flow with PKCE.
//!
//! The client half ([`oauth`]) starts a login, handles the provider's redirect and keeps the
//! session token. The relay half ([`relay`]) is a small HTTP service that holds the client
//! secret and performs the code-for-token exchange on the client's behalf.

pub mod app;
mod infra;
pub mod oauth;
pub mod protocol;
pub mod relay;
mod shared;

pub use infra::settings::{self, ClientConfig, RelayConfig};
pub use infra::storage::{self, KeyValueStorage, MemoryStorage, SqliteStorage};
pub use oauth::authorize::{
    begin_login, build_authorize_url, Navigator, SystemBrowserNavigator, VERIFIER_STORAGE_KEY,
};
pub use oauth::callback::{parse_callback_query, CallbackHandler, CallbackQuery, CallbackState};
pub use oauth::pkce::{
    derive_challenge, generate_verifier, ChallengeHasher, OsRandomSource, PkcePair, RandomSource,
    Sha256Hasher,
};
pub use oauth::relay_client::{RelayClient, TokenExchanger};
pub use oauth::session::SessionStore;
pub use relay::RelayServer;
pub use shared::error::{AppError, AppResult};
