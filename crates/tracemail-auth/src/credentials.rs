//! Client credential configuration
//!
//! App-only (daemon) registrations authenticate with a client id and secret
//! against their tenant's token endpoint. Everything here is plain data;
//! the exchange itself lives in [`crate::keeper`].

use std::env;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

/// Default Microsoft identity platform authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default resource the requested token is scoped to
pub const DEFAULT_RESOURCE: &str = "https://graph.microsoft.com";

/// Default lead time for proactive renewal (5 minutes)
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5 * 60);

const ENV_CLIENT_ID: &str = "TRACEMAIL_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "TRACEMAIL_CLIENT_SECRET";
const ENV_TENANT_ID: &str = "TRACEMAIL_TENANT_ID";
const ENV_RESOURCE: &str = "TRACEMAIL_RESOURCE";
const ENV_GRANT_TYPE: &str = "TRACEMAIL_GRANT_TYPE";
const ENV_AUTHORITY: &str = "TRACEMAIL_AUTHORITY";
const ENV_GRACE_PERIOD: &str = "TRACEMAIL_TOKEN_GRACE_PERIOD";

/// OAuth2 client credentials for a single tenant
///
/// Immutable once constructed; the keeper holds one copy for the lifetime
/// of the process.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    /// Base URI of the API the token is minted for
    pub resource: String,
    pub grant_type: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
            resource: DEFAULT_RESOURCE.to_string(),
            grant_type: "client_credentials".to_string(),
        }
    }

    /// Read credentials from `TRACEMAIL_*` environment variables
    ///
    /// Every key is required; a missing one fails loading instead of
    /// falling back to a default.
    pub fn from_env() -> AuthResult<Self> {
        Ok(Self {
            client_id: required(ENV_CLIENT_ID)?,
            client_secret: required(ENV_CLIENT_SECRET)?,
            tenant_id: required(ENV_TENANT_ID)?,
            resource: required(ENV_RESOURCE)?.trim_end_matches('/').to_string(),
            grant_type: required(ENV_GRANT_TYPE)?,
        })
    }

    /// Scope requested from the token endpoint
    pub fn scope(&self) -> String {
        format!("{}/.default", self.resource.trim_end_matches('/'))
    }

    /// Token endpoint URL for this tenant under the given authority
    pub fn token_url(&self, authority: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Tunables for [`crate::TokenKeeper`]
#[derive(Debug, Clone)]
pub struct KeeperOptions {
    /// Authority the token request is sent to; override for sovereign
    /// clouds or tests
    pub authority: String,
    /// How far ahead of expiry the token is renewed
    pub grace: Duration,
}

impl Default for KeeperOptions {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            grace: DEFAULT_GRACE,
        }
    }
}

impl KeeperOptions {
    /// Read options from `TRACEMAIL_*` environment variables
    ///
    /// Both keys are optional; the grace period is given in whole minutes.
    pub fn from_env() -> AuthResult<Self> {
        let authority = env::var(ENV_AUTHORITY)
            .unwrap_or_else(|_| DEFAULT_AUTHORITY.to_string())
            .trim_end_matches('/')
            .to_string();

        let grace = match env::var(ENV_GRACE_PERIOD) {
            Ok(raw) => {
                let minutes: u64 = raw.parse().map_err(|_| {
                    AuthError::InvalidConfig(format!(
                        "{ENV_GRACE_PERIOD} must be a number of minutes, got {raw:?}"
                    ))
                })?;
                Duration::from_secs(minutes * 60)
            }
            Err(_) => DEFAULT_GRACE,
        };

        Ok(Self { authority, grace })
    }
}

fn required(key: &'static str) -> AuthResult<String> {
    env::var(key).map_err(|_| AuthError::MissingConfig(key))
}
