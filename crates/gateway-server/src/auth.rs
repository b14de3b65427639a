//! Bearer token authentication for routes with a security policy.
//!
//! A route either names a [`SecurityPolicy`] or is public. Tokens are
//! verified with the policy's shared secret or with a key from its JWKS
//! document. JWKS documents are cached per URI for the policy's cache
//! duration and refetched once when a token names a key id the cached
//! document does not contain.

use dashmap::DashMap;
use gateway_config::{KeySource, SecurityPolicy};
use gateway_core::GatewayError;
use http::{header, HeaderMap, StatusCode};
use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, jwk::JwkSet, DecodingKey, TokenData, Validation,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registered claims the gateway reads from a verified token
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    /// Subject
    pub sub: Option<String>,
    /// Issuer
    pub iss: Option<String>,
    /// Expiration time
    pub exp: Option<i64>,
}

/// Caller identity established by a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Token subject
    pub subject: Option<String>,
    /// Token issuer
    pub issuer: Option<String>,
    /// Policy the token was verified against
    pub policy: String,
}

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Verifies bearer tokens against security policies
#[derive(Clone)]
pub struct Authenticator {
    http_client: Client,
    jwks_cache: Arc<DashMap<String, CachedJwks>>,
}

impl Authenticator {
    /// Create an authenticator with an empty JWKS cache
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new() -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            jwks_cache: Arc::new(DashMap::new()),
        })
    }

    /// Verify the request's bearer token against a policy
    ///
    /// # Errors
    /// Returns error if the token is missing, malformed, signed with an
    /// unknown key or algorithm, expired, issued by another issuer, meant
    /// for another audience, or if the JWKS document cannot be fetched
    pub async fn authenticate(
        &self,
        policy: &SecurityPolicy,
        headers: &HeaderMap,
    ) -> Result<Principal, AuthError> {
        let token = bearer_token(headers)?;

        let token_header = decode_header(token).map_err(|e| {
            AuthError::InvalidToken(format!("Failed to decode token header: {e}"))
        })?;

        if !policy.algorithms.contains(&token_header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "Algorithm {:?} not accepted",
                token_header.alg
            )));
        }

        let key = match &policy.key_source {
            KeySource::Secret(secret) => {
                DecodingKey::from_secret(secret.expose_secret().as_bytes())
            }
            KeySource::Jwks {
                uri,
                fetch_timeout,
                cache_duration,
            } => {
                self.key_from_jwks(
                    uri.as_str(),
                    token_header.kid.as_deref(),
                    *fetch_timeout,
                    *cache_duration,
                )
                .await?
            }
        };

        let mut validation = Validation::new(token_header.alg);
        validation.leeway = policy.leeway.as_secs();

        if let Some(issuer) = &policy.issuer {
            validation.set_issuer(&[issuer]);
        }

        if policy.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&policy.audiences);
        }

        let token_data: TokenData<JwtClaims> =
            decode(token, &key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
                _ => {
                    debug!(error = %e, policy = %policy.name, "JWT validation failed");
                    AuthError::InvalidToken(format!("Token validation failed: {e}"))
                }
            })?;

        let claims = token_data.claims;
        Ok(Principal {
            subject: claims.sub,
            issuer: claims.iss,
            policy: policy.name.clone(),
        })
    }

    async fn key_from_jwks(
        &self,
        uri: &str,
        kid: Option<&str>,
        fetch_timeout: Duration,
        cache_duration: Duration,
    ) -> Result<DecodingKey, AuthError> {
        let kid =
            kid.ok_or_else(|| AuthError::InvalidToken("Token missing kid header".to_string()))?;

        let (mut jwks, fresh) = self.jwks(uri, fetch_timeout, cache_duration, false).await?;

        if jwks.find(kid).is_none() && !fresh {
            debug!(kid, uri, "Unknown key id, refetching JWKS");
            jwks = self.jwks(uri, fetch_timeout, cache_duration, true).await?.0;
        }

        let jwk = jwks
            .find(kid)
            .ok_or_else(|| AuthError::InvalidToken(format!("Key not found in JWKS: {kid}")))?;

        DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(format!("Invalid JWK: {e}")))
    }

    /// Cached or freshly fetched JWKS; the flag is true for a fresh fetch
    async fn jwks(
        &self,
        uri: &str,
        fetch_timeout: Duration,
        cache_duration: Duration,
        force: bool,
    ) -> Result<(JwkSet, bool), AuthError> {
        if !force {
            if let Some(cached) = self.jwks_cache.get(uri) {
                if cached.fetched_at.elapsed() < cache_duration {
                    return Ok((cached.jwks.clone(), false));
                }
            }
        }

        debug!(uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(uri)
            .timeout(fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(uri, error = %e, "JWKS fetch failed");
                AuthError::KeyFetch(format!("Failed to fetch JWKS: {e}"))
            })?;

        if !response.status().is_success() {
            warn!(uri, status = %response.status(), "JWKS fetch failed");
            return Err(AuthError::KeyFetch(format!(
                "JWKS fetch failed with status: {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("Failed to parse JWKS: {e}")))?;

        info!(uri, keys = jwks.keys.len(), "Loaded JWKS");

        self.jwks_cache.insert(
            uri.to_string(),
            CachedJwks {
                jwks: jwks.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok((jwks, true))
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("cached_jwks", &self.jwks_cache.len())
            .finish_non_exhaustive()
    }
}

/// Token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken("Authorization header is not ASCII".to_string()))?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingCredentials)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredentials);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// Authentication error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// No bearer token
    #[error("Authentication required")]
    MissingCredentials,

    /// Token failed verification
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token expired
    #[error("Credentials expired")]
    ExpiredCredential,

    /// JWKS document unavailable
    #[error("Key retrieval failed: {0}")]
    KeyFetch(String),

    /// Authenticator misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Get error code for API response
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "authentication_required",
            Self::InvalidToken(_) => "invalid_token",
            Self::ExpiredCredential => "expired_credentials",
            Self::KeyFetch(_) => "key_unavailable",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Configuration(message) => Self::internal(message),
            other => Self::authentication(other.to_string()),
        }
    }
}
