//! JWT authentication and role-based authorization.
//!
//! Access and refresh tokens are HS256 JWTs; refresh tokens are also held
//! server-side by `jti` so they can be revoked.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ApiError, ErrorCode};

/// Operator roles, least privileged last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Auditor,
}

/// Actions the role guard distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Approve,
    Rollback,
    Modify,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "operator" => Some(Self::Operator),
            "auditor" => Some(Self::Auditor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Auditor => "auditor",
        }
    }

    /// admin: read+approve+rollback+modify; operator: read+approve;
    /// auditor: read only.
    pub fn permits(&self, action: Action) -> bool {
        match (self, action) {
            (_, Action::Read) => true,
            (Self::Admin, _) => true,
            (Self::Operator, Action::Approve) => true,
            _ => false,
        }
    }
}

/// JWT claims. `kind` separates access from refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub jti: String,
    pub kind: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller, attached to request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

impl AuthContext {
    /// Role gate: 403 with the request correlation id on a miss.
    pub fn authorize(&self, action: Action, correlation_id: &str) -> Result<(), ApiError> {
        if self.role.permits(action) {
            return Ok(());
        }
        Err(ApiError::forbidden(correlation_id))
    }
}

/// Token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// A provisioned operator account.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub username: String,
    /// Hex SHA-256 of the password
    pub password_digest: String,
    pub role: Role,
}

/// Static user directory. Production deployments would back this with an
/// IdP; the contract here is only username/digest/role lookup.
#[derive(Default)]
pub struct UserDirectory {
    users: HashMap<String, UserAccount>,
}

/// Hex SHA-256 digest used for stored passwords.
pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, password: &str, role: Role) -> Self {
        self.users.insert(
            username.to_string(),
            UserAccount {
                username: username.to_string(),
                password_digest: password_digest(password),
                role,
            },
        );
        self
    }

    pub fn verify(&self, username: &str, password: &str) -> Option<&UserAccount> {
        let account = self.users.get(username)?;
        if account.password_digest == password_digest(password) {
            Some(account)
        } else {
            None
        }
    }
}

struct RefreshRecord {
    user_id: String,
    expires_at: i64,
}

/// Authentication service: login, refresh rotation, revocation, access
/// verification.
pub struct AuthService {
    secret: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    users: UserDirectory,
    // Refresh tokens by jti, so logout and rotation can revoke them.
    refresh_tokens: RwLock<HashMap<String, RefreshRecord>>,
}

impl AuthService {
    pub fn new(
        secret: impl Into<String>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
        users: UserDirectory,
    ) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_secs,
            refresh_ttl_secs,
            users,
            refresh_tokens: RwLock::new(HashMap::new()),
        }
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    fn issue_pair(&self, user_id: &str, role: Role) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();

        let access = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            kind: "access".to_string(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        let refresh = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            kind: "refresh".to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };

        self.refresh_tokens.write().insert(
            refresh.jti.clone(),
            RefreshRecord {
                user_id: user_id.to_string(),
                expires_at: refresh.exp,
            },
        );

        Ok(TokenPair {
            access_token: self.encode_claims(&access)?,
            refresh_token: self.encode_claims(&refresh)?,
            expires_in: self.access_ttl_secs,
            token_type: "Bearer".to_string(),
        })
    }

    pub fn login(
        &self,
        username: &str,
        password: &str,
        correlation_id: &str,
    ) -> Result<TokenPair, ApiError> {
        let account = self.users.verify(username, password).ok_or_else(|| {
            ApiError::unauthorized("invalid credentials", correlation_id)
        })?;
        self.issue_pair(&account.username, account.role)
            .map_err(|_| ApiError::new(ErrorCode::Internal, "token issuance failed", correlation_id))
    }

    /// Rotate a refresh token: the old jti is revoked, a new pair issued.
    pub fn refresh(&self, refresh_token: &str, correlation_id: &str) -> Result<TokenPair, ApiError> {
        let claims = self
            .decode_claims(refresh_token)
            .map_err(|_| ApiError::unauthorized("invalid refresh token", correlation_id))?;
        if claims.kind != "refresh" {
            return Err(ApiError::unauthorized("not a refresh token", correlation_id));
        }

        {
            let mut tokens = self.refresh_tokens.write();
            match tokens.remove(&claims.jti) {
                Some(record) if record.expires_at > Utc::now().timestamp() => {}
                _ => {
                    return Err(ApiError::unauthorized(
                        "refresh token revoked or expired",
                        correlation_id,
                    ))
                }
            }
        }

        let role = Role::parse(&claims.role)
            .ok_or_else(|| ApiError::unauthorized("unknown role", correlation_id))?;
        self.issue_pair(&claims.sub, role)
            .map_err(|_| ApiError::new(ErrorCode::Internal, "token issuance failed", correlation_id))
    }

    /// Revoke one refresh token, or all of the user's when `all_sessions`.
    pub fn logout(
        &self,
        refresh_token: &str,
        all_sessions: bool,
        correlation_id: &str,
    ) -> Result<(), ApiError> {
        let claims = self
            .decode_claims(refresh_token)
            .map_err(|_| ApiError::unauthorized("invalid refresh token", correlation_id))?;

        let mut tokens = self.refresh_tokens.write();
        if all_sessions {
            tokens.retain(|_, record| record.user_id != claims.sub);
        } else {
            tokens.remove(&claims.jti);
        }
        Ok(())
    }

    /// Verify an access token from an `Authorization: Bearer` header.
    pub fn verify_access(&self, token: &str, correlation_id: &str) -> Result<AuthContext, ApiError> {
        let claims = self
            .decode_claims(token)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::unauthorized("token expired", correlation_id)
                }
                _ => ApiError::unauthorized("invalid token", correlation_id),
            })?;
        if claims.kind != "access" {
            return Err(ApiError::unauthorized("not an access token", correlation_id));
        }
        let role = Role::parse(&claims.role)
            .ok_or_else(|| ApiError::unauthorized("unknown role", correlation_id))?;
        Ok(AuthContext {
            user_id: claims.sub,
            role,
        })
    }
}
