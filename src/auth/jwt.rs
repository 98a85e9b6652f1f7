//! JWT bearer token verification
//!
//! Tokens are issued by the campus identity service and signed with HS256.
//! This service only verifies them and turns the claims into a [`Principal`].
//! Token generation exists for dev mode and tests.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::permissions::parse_permissions;
use super::principal::{Principal, Role};
use crate::config::MIN_JWT_SECRET_LEN;
use crate::types::TrackerError;

/// Issuer expected in every token
pub const TOKEN_ISSUER: &str = "prestasi-system";

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    /// Role name as issued (e.g. "Mahasiswa", "Dosen Wali", "Admin")
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    /// Resolve the immutable request principal.
    pub fn into_principal(self) -> Result<Principal, TrackerError> {
        let role: Role = self.role.parse().map_err(TrackerError::Unauthorized)?;
        let permissions = parse_permissions(&self.permissions);
        Ok(Principal::new(self.user_id, role).with_permissions(permissions))
    }
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// JWT validator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, TrackerError> {
        if secret.is_empty() {
            return Err(TrackerError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(TrackerError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode (accepts a short secret)
    pub fn new_dev(secret: String) -> Self {
        Self {
            secret,
            expiry_seconds: 3600,
        }
    }

    /// Generate a signed token
    pub fn generate_token(&self, input: TokenInput) -> Result<String, TrackerError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TrackerError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id: input.user_id,
            username: input.username,
            role: input.role,
            permissions: input.permissions,
            iss: TOKEN_ISSUER.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TrackerError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let mut validation = Validation::default();
        validation.set_issuer(&[TOKEN_ISSUER]);

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    ErrorKind::InvalidIssuer => "Invalid issuer",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }

    /// Verify a token and resolve its principal in one step.
    pub fn authenticate(&self, token: &str) -> Result<Principal, TrackerError> {
        let result = self.verify_token(token);
        match result.claims {
            Some(claims) if result.valid => claims.into_principal(),
            _ => Err(TrackerError::Unauthorized(
                result.error.unwrap_or_else(|| "Invalid token".into()),
            )),
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
