use crate::api::models::TokenResponse;
use crate::error::{AppError, AppResult};
use crate::store::{CredentialStore, Credentials};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;

const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

const SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "user-read-recently-played",
    "user-library-read",
    "user-library-modify",
];

pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// 64 random bytes base64url-encoded: 86 chars from the unreserved
    /// set, comfortably over the 43-char minimum.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier_bytes: Vec<u8> = (0..64).map(|_| rng.gen::<u8>()).collect();
        let verifier = URL_SAFE_NO_PAD.encode(&verifier_bytes);
        let challenge = challenge_for(&verifier);

        Self {
            verifier,
            challenge,
        }
    }
}

pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Owns the PKCE handshake and token refresh. The credential store is
/// shared with the rest of the crate; this is the only component that
/// writes to it.
pub struct Authenticator {
    http: reqwest::Client,
    client_id: String,
    redirect_uri: String,
    store: Arc<dyn CredentialStore>,
    /// Serializes refreshes: concurrent callers needing a fresh token
    /// wait here and re-check the store instead of issuing duplicates.
    refresh_lock: Mutex<()>,
    token_url: String,
}

impl Authenticator {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        redirect_uri: String,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            client_id,
            redirect_uri,
            store,
            refresh_lock: Mutex::new(()),
            token_url: TOKEN_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    fn callback_url(&self) -> String {
        format!("{}/callback", self.redirect_uri)
    }

    /// Start an authorization attempt: generate a fresh verifier (never
    /// reused across attempts), persist it, and return the URL the user
    /// agent must navigate to. Control comes back via the redirect.
    pub fn begin_auth(&self) -> AppResult<String> {
        let pkce = PkceChallenge::generate();
        self.store.set_verifier(&pkce.verifier)?;

        let url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge_method=S256&code_challenge={}",
            AUTH_URL,
            self.client_id,
            urlencoding::encode(&self.callback_url()),
            urlencoding::encode(&SCOPES.join(" ")),
            pkce.challenge
        );
        log::info!("[auth] authorization URL built");
        Ok(url)
    }

    /// Pull the `code` query parameter out of the redirect URL the
    /// identity provider sent the user agent back to.
    pub fn extract_code(redirect: &str) -> AppResult<String> {
        let parsed = url::Url::parse(redirect)
            .map_err(|e| AppError::Config(format!("Bad redirect URL: {}", e)))?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| AppError::Config("Redirect URL carries no authorization code".into()))
    }

    /// Trade the authorization code for tokens. Idempotent: a stored,
    /// unexpired token short-circuits without a network call, so a
    /// replayed redirect does not burn a second exchange. A successful
    /// exchange consumes the verifier; pairing it with a second code
    /// requires a new `begin_auth`.
    pub async fn exchange_code(&self, code: &str) -> AppResult<Credentials> {
        if let Some(credentials) = self.store.get() {
            if !credentials.is_expired() {
                log::debug!("[auth] valid token present, skipping code exchange");
                return Ok(credentials);
            }
        }

        let verifier = self
            .store
            .verifier()
            .ok_or_else(|| AppError::Config("No pending authorization attempt".into()))?;
        let callback = self.callback_url();

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &callback),
            ("client_id", &self.client_id),
            ("code_verifier", &verifier),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AuthExchange {
                status: status.as_u16(),
                message: body,
            });
        }

        let token: TokenResponse = response.json().await?;
        let refresh_token = token.refresh_token.ok_or_else(|| AppError::AuthExchange {
            status: status.as_u16(),
            message: "Token response carried no refresh_token".into(),
        })?;

        let credentials = Credentials {
            access_token: token.access_token,
            refresh_token,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(token.expires_in as i64),
        };
        self.store.put(&credentials)?;
        self.store.clear_verifier()?;
        log::info!("[auth] code exchange complete");
        Ok(credentials)
    }

    /// Refresh the stored credentials. Any failure clears them: the
    /// caller must restart `begin_auth`. Expired refresh tokens and
    /// network errors are deliberately not distinguished.
    pub async fn refresh(&self) -> AppResult<Credentials> {
        let current = self.store.get().ok_or(AppError::ReauthRequired)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", &current.refresh_token),
            ("client_id", &self.client_id),
        ];

        let response = match self.http.post(&self.token_url).form(&params).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("[auth] token refresh did not reach the server: {}", e);
                self.store.clear()?;
                return Err(AppError::ReauthRequired);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[auth] token refresh rejected ({}): {}", status, body);
            self.store.clear()?;
            return Err(AppError::ReauthRequired);
        }

        let token: TokenResponse = match response.json().await {
            Ok(token) => token,
            Err(e) => {
                log::warn!("[auth] token refresh returned a malformed body: {}", e);
                self.store.clear()?;
                return Err(AppError::ReauthRequired);
            }
        };
        let credentials = Credentials {
            access_token: token.access_token,
            // The provider may rotate the refresh token; keep the old one
            // when it does not.
            refresh_token: token.refresh_token.unwrap_or(current.refresh_token),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(token.expires_in as i64),
        };
        self.store.put(&credentials)?;
        log::info!("[auth] token refreshed");
        Ok(credentials)
    }

    /// A bearer token guaranteed fresh at the moment of return,
    /// refreshing transparently when expired. Exactly one refresh runs
    /// at a time; late arrivals see the refreshed store and return
    /// without a second request.
    pub async fn access_token(&self) -> AppResult<String> {
        let credentials = self.store.get().ok_or(AppError::ReauthRequired)?;
        if !credentials.is_expired() {
            return Ok(credentials.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // A concurrent caller may have refreshed while we waited.
        if let Some(credentials) = self.store.get() {
            if !credentials.is_expired() {
                return Ok(credentials.access_token);
            }
        }
        let refreshed = self.refresh().await?;
        Ok(refreshed.access_token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn logout(&self) -> AppResult<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Loopback token endpoint answering every POST with the same JSON
    /// body, counting how many requests actually arrive.
    async fn spawn_token_server(body: &'static str) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let server_hits = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                server_hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    fn authenticator(store: Arc<dyn CredentialStore>) -> Authenticator {
        Authenticator::new(
            reqwest::Client::new(),
            "client-id".into(),
            "http://localhost:5173".into(),
            store,
        )
        // Unroutable: any accidental network call fails immediately.
        .with_token_url("http://127.0.0.1:1/token")
    }

    fn valid_credentials() -> Credentials {
        Credentials {
            access_token: "fresh-token".into(),
            refresh_token: "rt".into(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn verifier_meets_pkce_requirements() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert!(a.verifier.len() >= 43);
        assert!(a
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn challenge_matches_rfc7636_vector() {
        // RFC 7636 appendix B
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn begin_auth_persists_a_fresh_verifier_each_attempt() {
        let store = Arc::new(MemoryStore::new());
        let auth = authenticator(store.clone());

        let url_a = auth.begin_auth().unwrap();
        let verifier_a = store.verifier().unwrap();
        let url_b = auth.begin_auth().unwrap();
        let verifier_b = store.verifier().unwrap();

        assert_ne!(verifier_a, verifier_b);
        assert!(url_a.contains("code_challenge_method=S256"));
        assert!(url_a.contains("response_type=code"));
        assert!(url_b.contains(&challenge_for(&verifier_b)));
    }

    #[test]
    fn extract_code_reads_query_parameter() {
        let code =
            Authenticator::extract_code("http://localhost:5173/callback?code=abc123&state=x")
                .unwrap();
        assert_eq!(code, "abc123");
        assert!(Authenticator::extract_code("http://localhost:5173/callback").is_err());
    }

    #[tokio::test]
    async fn exchange_code_short_circuits_on_valid_token() {
        let store = Arc::new(MemoryStore::new());
        store.put(&valid_credentials()).unwrap();
        let auth = authenticator(store);

        // No network calls happen: the token URL is unroutable, so a
        // real exchange attempt would error out.
        let first = auth.exchange_code("ignored").await.unwrap();
        let second = auth.exchange_code("ignored").await.unwrap();
        assert_eq!(first.access_token, "fresh-token");
        assert_eq!(second.access_token, first.access_token);
    }

    #[tokio::test]
    async fn access_token_skips_refresh_while_fresh() {
        let store = Arc::new(MemoryStore::new());
        store.put(&valid_credentials()).unwrap();
        let auth = authenticator(store);

        assert_eq!(auth.access_token().await.unwrap(), "fresh-token");
    }

    #[tokio::test]
    async fn failed_refresh_clears_credentials_and_requires_reauth() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&Credentials {
                access_token: "stale".into(),
                refresh_token: "rt".into(),
                expires_at: Utc::now() - Duration::minutes(5),
            })
            .unwrap();
        let auth = authenticator(store.clone());

        let err = auth.access_token().await.unwrap_err();
        assert!(matches!(err, AppError::ReauthRequired));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn access_token_without_credentials_requires_reauth() {
        let auth = authenticator(Arc::new(MemoryStore::new()));
        assert!(matches!(
            auth.access_token().await.unwrap_err(),
            AppError::ReauthRequired
        ));
    }

    #[tokio::test]
    async fn expired_token_triggers_one_refresh_before_returning() {
        let (addr, hits) = spawn_token_server(
            r#"{"access_token": "refreshed", "refresh_token": "rt2", "expires_in": 3600}"#,
        )
        .await;
        let store = Arc::new(MemoryStore::new());
        store
            .put(&Credentials {
                access_token: "stale".into(),
                refresh_token: "rt".into(),
                expires_at: Utc::now() - Duration::minutes(5),
            })
            .unwrap();
        let auth = Arc::new(
            Authenticator::new(
                reqwest::Client::new(),
                "client-id".into(),
                "http://localhost:5173".into(),
                store.clone(),
            )
            .with_token_url(&format!("http://{}/token", addr)),
        );

        // Two callers race for a token; the single-flight lock collapses
        // them into one refresh request.
        let (a, b) = tokio::join!(auth.access_token(), auth.access_token());
        assert_eq!(a.unwrap(), "refreshed");
        assert_eq!(b.unwrap(), "refreshed");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get().unwrap().refresh_token, "rt2");

        // Freshly refreshed: another call goes straight to the store.
        assert_eq!(auth.access_token().await.unwrap(), "refreshed");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_exchange_consumes_the_verifier() {
        let (addr, hits) = spawn_token_server(
            r#"{"access_token": "at", "refresh_token": "rt", "expires_in": 3600}"#,
        )
        .await;
        let store = Arc::new(MemoryStore::new());
        let auth = Authenticator::new(
            reqwest::Client::new(),
            "client-id".into(),
            "http://localhost:5173".into(),
            store.clone(),
        )
        .with_token_url(&format!("http://{}/token", addr));

        auth.begin_auth().unwrap();
        assert!(store.verifier().is_some());

        let credentials = auth.exchange_code("abc").await.unwrap();
        assert_eq!(credentials.access_token, "at");
        assert!(store.verifier().is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Once the token expires, a different code cannot ride on the
        // consumed verifier; a new attempt has to start from begin_auth.
        store
            .put(&Credentials {
                access_token: "at".into(),
                refresh_token: "rt".into(),
                expires_at: Utc::now() - Duration::minutes(1),
            })
            .unwrap();
        let err = auth.exchange_code("other").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
