//! Background token lifecycle
//!
//! [`TokenKeeper`] performs the client-credentials exchange and keeps the
//! resulting access token fresh from a background task. Reads never touch
//! the network: callers get whatever token is currently cached, or nothing
//! while the keeper is degraded.
//!
//! The renewal loop oscillates between two states for the life of the
//! process. While a token is held, the next renewal runs `grace` ahead of
//! the reported expiry. After a failed exchange the cached token is cleared
//! and the loop retries every minute until the authority answers again.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::{Credentials, KeeperOptions};
use crate::error::{AuthError, AuthResult};

/// Wait between attempts while the token endpoint is failing
const RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Ceiling on the lifetime reported by the token endpoint; keeps the
/// expiry arithmetic within chrono's datetime range
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// An access token and the instant it stops being valid
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Whether the expiry instant has passed
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Success body of the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds, relative to now
    expires_in: u64,
}

/// The single cached token, shared between the keeper and its renewal task
#[derive(Default)]
struct TokenCell {
    current: RwLock<Option<BearerToken>>,
}

impl TokenCell {
    fn store(&self, token: BearerToken) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(token);
    }

    fn clear(&self) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    fn get(&self) -> Option<BearerToken> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Holder for the scheduled renewal task
///
/// At most one task is ever held: installing a new handle aborts the
/// previous one, and cancelling twice is harmless.
struct RenewalSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenewalSlot {
    fn empty() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    fn install(&self, handle: JoinHandle<()>) {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

/// Delay until the next renewal for a token with the given lifetime
///
/// Renewal runs `grace` ahead of expiry; a token shorter-lived than the
/// grace period renews again immediately instead of erroring.
fn renewal_delay(lifetime: Duration, grace: Duration) -> Duration {
    lifetime.saturating_sub(grace)
}

/// One renewal round trip plus the shared state it updates
struct Renewer {
    http: Client,
    credentials: Credentials,
    token_url: String,
    grace: Duration,
    cell: Arc<TokenCell>,
}

impl Renewer {
    /// Fetch a fresh token and report how long to wait before the next
    /// attempt
    async fn renew(&self) -> Duration {
        match self.request_token().await {
            Ok(response) => {
                let lifetime = Duration::from_secs(response.expires_in).min(MAX_TOKEN_LIFETIME);
                let delay = renewal_delay(lifetime, self.grace);
                self.cell.store(BearerToken {
                    access_token: response.access_token,
                    expires_at: Utc::now() + TimeDelta::seconds(lifetime.as_secs() as i64),
                });
                info!(
                    "access token renewed, next renewal in {}s",
                    delay.as_secs()
                );
                delay
            }
            Err(e) => {
                self.cell.clear();
                warn!(
                    "token renewal failed: {e}; retrying in {}s",
                    RETRY_INTERVAL.as_secs()
                );
                RETRY_INTERVAL
            }
        }
    }

    async fn request_token(&self) -> AuthResult<TokenResponse> {
        debug!("requesting access token from {}", self.token_url);
        let scope = self.credentials.scope();
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", scope.as_str()),
                ("grant_type", self.credentials.grant_type.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))
    }
}

/// Keeps one valid bearer token available for the life of the process
///
/// Constructed once at startup and shared (behind an `Arc`) with every
/// component that talks to the API. Dropping the keeper cancels the
/// renewal task.
pub struct TokenKeeper {
    cell: Arc<TokenCell>,
    slot: RenewalSlot,
}

impl TokenKeeper {
    /// Perform the first token exchange and start the renewal loop
    ///
    /// Only a failure to construct the HTTP client is fatal. An
    /// unreachable token endpoint leaves the keeper degraded, with
    /// [`TokenKeeper::token`] returning `None` until a retry succeeds.
    pub async fn start(credentials: Credentials, options: KeeperOptions) -> AuthResult<Self> {
        let http = Client::builder().build().map_err(AuthError::ClientBuild)?;
        let cell = Arc::new(TokenCell::default());
        let renewer = Renewer {
            token_url: credentials.token_url(&options.authority),
            http,
            credentials,
            grace: options.grace,
            cell: cell.clone(),
        };

        let initial_delay = renewer.renew().await;

        let slot = RenewalSlot::empty();
        slot.install(tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::time::sleep(delay).await;
                delay = renewer.renew().await;
            }
        }));

        Ok(Self { cell, slot })
    }

    /// Current access token, if one is cached
    ///
    /// Never blocks and never triggers a renewal.
    pub fn token(&self) -> Option<String> {
        self.cell.get().map(|token| token.access_token)
    }

    /// Snapshot of the cached token together with its expiry instant
    pub fn current(&self) -> Option<BearerToken> {
        self.cell.get()
    }

    /// Whether a token is currently held
    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Cancel the scheduled renewal; safe to call more than once
    ///
    /// The cached token stays readable until it expires on its own.
    pub fn shutdown(&self) {
        self.slot.cancel();
    }
}

impl Drop for TokenKeeper {
    fn drop(&mut self) {
        self.slot.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

    fn test_credentials() -> Credentials {
        Credentials::new("client-1", "secret-1", "tenant-1")
    }

    fn options_for(server: &mockito::ServerGuard) -> KeeperOptions {
        KeeperOptions {
            authority: server.url(),
            grace: Duration::from_secs(300),
        }
    }

    fn test_renewer(server: &mockito::ServerGuard, grace: Duration) -> Renewer {
        let credentials = test_credentials();
        Renewer {
            http: Client::new(),
            token_url: credentials.token_url(&server.url()),
            credentials,
            grace,
            cell: Arc::new(TokenCell::default()),
        }
    }

    #[test]
    fn renewal_delay_subtracts_grace() {
        assert_eq!(
            renewal_delay(Duration::from_secs(3600), Duration::from_secs(300)),
            Duration::from_secs(3300)
        );
    }

    #[test]
    fn renewal_delay_clamps_short_lifetimes_to_zero() {
        assert_eq!(
            renewal_delay(Duration::from_secs(120), Duration::from_secs(300)),
            Duration::ZERO
        );
    }

    #[test]
    fn failed_renewals_retry_every_minute() {
        assert_eq!(RETRY_INTERVAL, Duration::from_secs(60));
    }

    #[test]
    fn bearer_token_expiry_is_checked_against_now() {
        let live = BearerToken {
            access_token: "tok".into(),
            expires_at: Utc::now() + TimeDelta::seconds(60),
        };
        let stale = BearerToken {
            access_token: "tok".into(),
            expires_at: Utc::now() - TimeDelta::seconds(1),
        };
        assert!(!live.is_expired());
        assert!(stale.is_expired());
    }

    #[tokio::test]
    async fn renew_caches_token_and_schedules_before_expiry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TOKEN_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret-1".into()),
                Matcher::UrlEncoded(
                    "scope".into(),
                    "https://graph.microsoft.com/.default".into(),
                ),
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-abc","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let renewer = test_renewer(&server, Duration::from_secs(300));
        let delay = renewer.renew().await;

        assert_eq!(delay, Duration::from_secs(3300));
        let token = renewer.cell.get().unwrap();
        assert_eq!(token.access_token, "tok-abc");
        assert!(token.expires_at > Utc::now());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn renew_caps_oversized_reported_lifetimes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_body(format!(
                r#"{{"access_token":"tok-forever","expires_in":{}}}"#,
                u64::MAX
            ))
            .create_async()
            .await;

        let renewer = test_renewer(&server, Duration::from_secs(300));
        let delay = renewer.renew().await;

        assert_eq!(
            delay,
            renewal_delay(MAX_TOKEN_LIFETIME, Duration::from_secs(300))
        );
        let token = renewer.cell.get().unwrap();
        assert_eq!(token.access_token, "tok-forever");
        assert!(token.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn renew_accepts_any_success_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TOKEN_PATH)
            .with_status(201)
            .with_body(r#"{"access_token":"tok-created","expires_in":3600}"#)
            .create_async()
            .await;

        let renewer = test_renewer(&server, Duration::from_secs(300));
        let delay = renewer.renew().await;

        assert_eq!(delay, Duration::from_secs(3300));
        assert_eq!(renewer.cell.get().unwrap().access_token, "tok-created");
    }

    #[tokio::test]
    async fn renew_clears_token_and_backs_off_on_endpoint_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TOKEN_PATH)
            .with_status(500)
            .with_body("temporarily unavailable")
            .create_async()
            .await;

        let renewer = test_renewer(&server, Duration::from_secs(300));
        renewer.cell.store(BearerToken {
            access_token: "stale".into(),
            expires_at: Utc::now() + TimeDelta::seconds(60),
        });

        let delay = renewer.renew().await;

        assert_eq!(delay, RETRY_INTERVAL);
        assert!(renewer.cell.get().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn start_makes_the_token_readable_without_blocking() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_body(r#"{"access_token":"tok-abc","expires_in":3600}"#)
            .create_async()
            .await;

        let keeper = TokenKeeper::start(test_credentials(), options_for(&server))
            .await
            .unwrap();

        assert!(keeper.is_ready());
        assert_eq!(keeper.token().as_deref(), Some("tok-abc"));
        assert!(!keeper.current().unwrap().is_expired());
        keeper.shutdown();
    }

    #[tokio::test]
    async fn start_survives_an_unreachable_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TOKEN_PATH)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let keeper = TokenKeeper::start(test_credentials(), options_for(&server))
            .await
            .unwrap();

        assert!(!keeper.is_ready());
        assert_eq!(keeper.token(), None);
        keeper.shutdown();
    }

    #[tokio::test]
    async fn short_lived_tokens_renew_repeatedly() {
        let mut server = mockito::Server::new_async().await;
        // expires_in is below the grace period, so every renewal
        // reschedules with a zero delay
        let mock = server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_body(r#"{"access_token":"tok-short","expires_in":1}"#)
            .expect_at_least(3)
            .create_async()
            .await;

        let keeper = TokenKeeper::start(test_credentials(), options_for(&server))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        keeper.shutdown();
        mock.assert_async().await;
        assert!(keeper.is_ready());
    }

    #[tokio::test]
    async fn shutdown_stops_renewing_and_is_idempotent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_body(r#"{"access_token":"tok-abc","expires_in":1}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let keeper = TokenKeeper::start(test_credentials(), options_for(&server))
            .await
            .unwrap();

        keeper.shutdown();
        keeper.shutdown();
        // token from the initial exchange survives shutdown
        assert!(keeper.is_ready());
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn renewal_slot_aborts_the_replaced_task() {
        let slot = RenewalSlot::empty();
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(dropped.clone());

        slot.install(tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));
        tokio::task::yield_now().await;

        slot.install(tokio::spawn(async {}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(dropped.load(Ordering::SeqCst));
        slot.cancel();
        slot.cancel();
    }
}
