use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::SheetsError;

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Service-account OAuth2 flow: a signed JWT is traded for a bearer token,
/// which is reused until shortly before it expires.
pub struct ServiceAccountAuth {
    client_email: String,
    key: EncodingKey,
    token_uri: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(
        client_email: &str,
        private_key_pem: &str,
        token_uri: &str,
        http: reqwest::Client,
    ) -> Result<Self, SheetsError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| SheetsError::Auth(format!("invalid private key: {}", e)))?;

        Ok(Self {
            client_email: client_email.to_string(),
            key,
            token_uri: token_uri.to_string(),
            http,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, SheetsError> {
        // Held across the exchange so concurrent callers wait for one refresh
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!(
                "token exchange failed with {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        info!("Obtained spreadsheet access token for {}", self.client_email);

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });

        Ok(token.access_token)
    }

    fn sign_assertion(&self, now: i64) -> Result<String, SheetsError> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| SheetsError::Auth(format!("failed to sign assertion: {}", e)))
    }
}
