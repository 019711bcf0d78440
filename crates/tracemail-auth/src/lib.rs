//! Authentication module for Tracemail
//!
//! Implements the OAuth2 client-credentials grant against the Microsoft
//! identity platform and keeps the access token fresh for the life of the
//! process:
//! 1. [`Credentials`] / [`KeeperOptions`] - static configuration, loadable
//!    from `TRACEMAIL_*` environment variables
//! 2. [`TokenKeeper`] - background renewal with non-blocking reads and a
//!    fixed one-minute retry while the authority is unreachable

mod credentials;
mod error;
mod keeper;

pub use credentials::{
    Credentials, KeeperOptions, DEFAULT_AUTHORITY, DEFAULT_GRACE, DEFAULT_RESOURCE,
};
pub use error::{AuthError, AuthResult};
pub use keeper::{BearerToken, TokenKeeper};
