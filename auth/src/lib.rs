//! Authentication module for the Google Photos Library API.
//!
//! Covers the OAuth2 authorization-code flow (with PKCE), refresh-token
//! exchange and persistence of the resulting token pair through a
//! [`TokenStore`].

use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

mod store;

#[cfg(feature = "file-store")]
pub use store::FileStore;
pub use store::{KeyringStore, MemoryStore, TokenStore, KEYRING_SERVICE_NAME};

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const PHOTOS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Keyring Error: {0}")]
    Keyring(String),
    #[error("OAuth Error: {0}")]
    OAuth(String),
    #[error("Authorization denied: {0}")]
    Denied(String),
    #[error("No authorization code found in redirect URL")]
    MissingCode,
    #[error("Redirect state does not match the authorization request")]
    StateMismatch,
    #[error("Missing client credentials: set {0}")]
    MissingClientCredentials(&'static str),
    #[error("No refresh token available")]
    NoRefreshToken,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Token store Error: {0}")]
    Store(String),
    #[error("Other Error: {0}")]
    Other(String),
}

/// Access/refresh token pair for one signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Credentials {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Same refresh token, new access token.
    pub fn with_access_token(&self, access_token: String) -> Self {
        Credentials {
            access_token,
            refresh_token: self.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_port: u16,
    pub token_url: String,
}

impl OAuthConfig {
    /// Read the client id/secret from `GOOGLE_CLIENT_ID` and
    /// `GOOGLE_CLIENT_SECRET`; `GOOGLE_TOKEN_URL` overrides the token endpoint.
    pub fn from_env(redirect_port: u16) -> Result<Self, AuthError> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| AuthError::MissingClientCredentials("GOOGLE_CLIENT_ID"))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| AuthError::MissingClientCredentials("GOOGLE_CLIENT_SECRET"))?;
        let token_url =
            std::env::var("GOOGLE_TOKEN_URL").unwrap_or_else(|_| TOKEN_URL.to_string());
        Ok(OAuthConfig {
            client_id,
            client_secret,
            redirect_port,
            token_url,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.redirect_port)
    }
}

/// A prepared consent URL plus the secrets needed to finish the flow.
pub struct AuthorizationRequest {
    pub url: Url,
    pub csrf_state: CsrfToken,
    pub pkce_verifier: PkceCodeVerifier,
}

pub struct OAuthClient {
    client: BasicClient,
}

impl OAuthClient {
    pub fn new(config: &OAuthConfig) -> Result<Self, AuthError> {
        let auth_url =
            AuthUrl::new(AUTH_URL.to_string()).map_err(|e| AuthError::Other(e.to_string()))?;
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AuthError::Other(e.to_string()))?;
        let redirect_url =
            RedirectUrl::new(config.redirect_uri()).map_err(|e| AuthError::Other(e.to_string()))?;

        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(OAuthClient { client })
    }

    /// Build the consent URL. Offline access and a forced consent prompt make
    /// the provider hand out a refresh token on every sign-in.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(PHOTOS_READONLY_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url,
            csrf_state,
            pkce_verifier,
        }
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip_all))]
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Credentials, AuthError> {
        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::OAuth(describe_token_error(e)))?;

        Ok(Credentials {
            access_token: token_response.access_token().secret().to_string(),
            refresh_token: token_response
                .refresh_token()
                .map(|t| t.secret().to_string()),
        })
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip_all))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let token_response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::OAuth(describe_token_error(e)))?;

        tracing::info!("Access token refreshed");
        Ok(token_response.access_token().secret().to_string())
    }
}

fn describe_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => match response.error_description() {
            Some(description) => format!("{}: {}", response.error(), description),
            None => response.error().to_string(),
        },
        other => other.to_string(),
    }
}

/// Exchanges a refresh token for a fresh access token.
#[allow(async_fn_in_trait)]
pub trait TokenRefresher {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError>;
}

impl TokenRefresher for OAuthClient {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError> {
        self.refresh(refresh_token).await
    }
}

/// Extract the authorization code from the first line of the redirect request.
pub fn parse_redirect(
    request_line: &str,
    port: u16,
    expected_state: &str,
) -> Result<String, AuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or(AuthError::MissingCode)?;
    let redirect_url = Url::parse(&format!("http://127.0.0.1:{}{}", port, target))
        .map_err(|e| AuthError::Other(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in redirect_url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(AuthError::Denied(value.into_owned())),
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    let code = code.ok_or(AuthError::MissingCode)?;
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    Ok(code)
}

/// Run the interactive sign-in: open the consent page, capture the redirect on
/// `127.0.0.1:<redirect_port>`, exchange the code and persist the tokens.
pub async fn authenticate(
    client: &OAuthClient,
    redirect_port: u16,
    store: &dyn TokenStore,
) -> Result<Credentials, AuthError> {
    let request = client.authorization_request();

    // Bind before opening the browser so a fast redirect is not refused.
    let listener = TcpListener::bind(("127.0.0.1", redirect_port)).await?;

    println!("Opening browser for authentication: {}", request.url);
    if let Err(e) = webbrowser::open(request.url.as_str()) {
        tracing::warn!(error = %e, "Could not open a browser, visit the URL manually");
    }

    let (stream, _) = listener.accept().await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let outcome = parse_redirect(&request_line, redirect_port, request.csrf_state.secret());
    let body = match &outcome {
        Ok(_) => "Signed in. You can close this window.",
        Err(_) => "Sign-in failed. Return to the terminal for details.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await?;

    let code = outcome?;
    let credentials = client.exchange_code(code, request.pkce_verifier).await?;
    store.save(&credentials)?;

    tracing::info!(
        has_refresh_token = credentials.refresh_token.is_some(),
        "Authentication successful"
    );
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocks::{rejecting_token_server, token_server};
    use serial_test::serial;

    fn config(token_url: String) -> OAuthConfig {
        OAuthConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_port: 8080,
            token_url,
        }
    }

    #[tokio::test]
    async fn test_refresh_access_token() {
        let server = token_server("new_token");
        let client = OAuthClient::new(&config(server.url_str("/token"))).unwrap();

        let result = client.refresh_access_token("refresh").await;
        assert!(result.is_ok(), "Refresh token failed: {:?}", result.err());
        assert_eq!(result.unwrap(), "new_token");
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let server = rejecting_token_server();
        let client = OAuthClient::new(&config(server.url_str("/token"))).unwrap();

        let err = client.refresh("revoked").await.unwrap_err();
        match err {
            AuthError::OAuth(msg) => assert!(msg.contains("invalid_grant"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_without_refresh_token() {
        let server = token_server("access");
        let client = OAuthClient::new(&config(server.url_str("/token"))).unwrap();
        let request = client.authorization_request();

        let creds = client
            .exchange_code("code".into(), request.pkce_verifier)
            .await
            .unwrap();
        assert_eq!(creds, Credentials::new("access", None));
    }

    #[test]
    fn test_authorization_url_parameters() {
        let client = OAuthClient::new(&config(TOKEN_URL.into())).unwrap();
        let request = client.authorization_request();
        let pairs: Vec<(String, String)> = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("scope"), Some(PHOTOS_READONLY_SCOPE));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("prompt"), Some("consent"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("redirect_uri"), Some("http://127.0.0.1:8080"));
        assert_eq!(get("state"), Some(request.csrf_state.secret().as_str()));
    }

    #[test]
    fn test_parse_redirect() {
        let line = "GET /?state=abc&code=4%2Fxyz&scope=photos HTTP/1.1\r\n";
        assert_eq!(parse_redirect(line, 8080, "abc").unwrap(), "4/xyz");

        assert!(matches!(
            parse_redirect("GET /?error=access_denied&state=abc HTTP/1.1", 8080, "abc"),
            Err(AuthError::Denied(reason)) if reason == "access_denied"
        ));
        assert!(matches!(
            parse_redirect("GET /?state=abc HTTP/1.1", 8080, "abc"),
            Err(AuthError::MissingCode)
        ));
        assert!(matches!(
            parse_redirect("GET /?code=c&state=other HTTP/1.1", 8080, "abc"),
            Err(AuthError::StateMismatch)
        ));
        assert!(matches!(
            parse_redirect("", 8080, "abc"),
            Err(AuthError::MissingCode)
        ));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::remove_var("GOOGLE_CLIENT_ID");
        std::env::remove_var("GOOGLE_CLIENT_SECRET");
        assert!(matches!(
            OAuthConfig::from_env(9000),
            Err(AuthError::MissingClientCredentials("GOOGLE_CLIENT_ID"))
        ));

        std::env::set_var("GOOGLE_CLIENT_ID", "id");
        std::env::set_var("GOOGLE_CLIENT_SECRET", "secret");
        std::env::set_var("GOOGLE_TOKEN_URL", "http://127.0.0.1:1/token");
        let cfg = OAuthConfig::from_env(9000).unwrap();
        assert_eq!(cfg.token_url, "http://127.0.0.1:1/token");
        assert_eq!(cfg.redirect_uri(), "http://127.0.0.1:9000");
        std::env::remove_var("GOOGLE_CLIENT_ID");
        std::env::remove_var("GOOGLE_CLIENT_SECRET");
        std::env::remove_var("GOOGLE_TOKEN_URL");
    }
}
