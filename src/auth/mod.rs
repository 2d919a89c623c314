//! Authentication module
//!
//! Private app tokens are sent as `Authorization: Bearer`. Requests to
//! hosts outside the API (e.g. the file CDN) go out with [`AuthConfig::None`].
//!
//! Tokens are passed in explicitly through configuration; nothing here reads
//! process-wide state.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::AuthConfig;

#[cfg(test)]
mod tests;
