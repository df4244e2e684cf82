//! Bearer-token access: the gate that turns an `Authorization` header into a principal, and
//! the issuer that exchanges staff credentials for a signed token.

use crate::error::{AppError, AuthRejection};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// JWT payload. `sub` is the staff email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub email: String,
    pub name: String,
    pub role: String,
}

impl From<Claims> for Principal {
    fn from(c: Claims) -> Self {
        Principal {
            email: c.sub,
            name: c.name,
            role: c.role,
        }
    }
}

pub trait AccessGate: Send + Sync {
    /// `header` is the raw `Authorization` header value, if any.
    fn authenticate(&self, header: Option<&str>) -> Result<Principal, AuthRejection>;
}

/// `Bearer <token>` with a non-empty token.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthRejection> {
    let header = header.ok_or(AuthRejection::MissingOrMalformedHeader)?.trim();
    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthRejection::MissingOrMalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthRejection::MissingOrMalformedHeader);
    }
    Ok(token)
}

/// HS256 verification with a shared secret.
#[derive(Clone)]
pub struct JwtGate {
    key: DecodingKey,
    validation: Validation,
}

impl JwtGate {
    pub fn new(secret: &str) -> Self {
        JwtGate {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl AccessGate for JwtGate {
    fn authenticate(&self, header: Option<&str>) -> Result<Principal, AuthRejection> {
        let token = bearer_token(header)?;
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| Principal::from(data.claims))
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AuthRejection::InvalidOrExpiredToken
            })
    }
}

/// A staff member who may log in. The password is kept only as a SHA-256 hex digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaffAccount {
    pub email: String,
    pub name: String,
    pub role: String,
    pub password_sha256: String,
}

pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Compare two digests without short-circuiting on the first differing byte.
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Principal,
}

pub struct CredentialIssuer {
    key: EncodingKey,
    ttl: Duration,
    accounts: Vec<StaffAccount>,
}

impl CredentialIssuer {
    pub fn new(secret: &str, ttl: Duration, accounts: Vec<StaffAccount>) -> Self {
        CredentialIssuer {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
            accounts,
        }
    }

    /// Unknown email and wrong password fail the same way.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AppError> {
        let email = request.email.trim().to_lowercase();
        let digest = password_digest(&request.password);
        let account = self
            .accounts
            .iter()
            .find(|a| a.email == email && digests_match(&a.password_sha256, &digest))
            .ok_or(AppError::Unauthorized(AuthRejection::InvalidCredentials))?;
        let now = Utc::now();
        self.issue(account, now)
    }

    pub fn issue(&self, account: &StaffAccount, now: DateTime<Utc>) -> Result<LoginResponse, AppError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: account.email.clone(),
            name: account.name.clone(),
            role: account.role.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))?;
        tracing::info!(email = %account.email, "staff login");
        Ok(LoginResponse {
            token,
            expires_at,
            user: Principal::from(claims),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn account() -> StaffAccount {
        StaffAccount {
            email: "desk@clinic.lt".into(),
            name: "Front Desk".into(),
            role: "admin".into(),
            password_sha256: password_digest("password"),
        }
    }

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new(SECRET, Duration::hours(1), vec![account()])
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            password_digest("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn login_issues_a_token_the_gate_accepts() {
        let resp = issuer()
            .login(&LoginRequest {
                email: " Desk@Clinic.LT ".into(),
                password: "password".into(),
            })
            .unwrap();
        let header = format!("Bearer {}", resp.token);
        let principal = JwtGate::new(SECRET).authenticate(Some(&header)).unwrap();
        assert_eq!(principal, resp.user);
        assert_eq!(principal.email, "desk@clinic.lt");
    }

    #[test]
    fn wrong_password_and_unknown_email_look_alike() {
        let bad_password = issuer()
            .login(&LoginRequest {
                email: "desk@clinic.lt".into(),
                password: "nope".into(),
            })
            .unwrap_err();
        let unknown = issuer()
            .login(&LoginRequest {
                email: "who@clinic.lt".into(),
                password: "password".into(),
            })
            .unwrap_err();
        assert_eq!(bad_password.public_message(), unknown.public_message());
        assert!(matches!(bad_password, AppError::Unauthorized(AuthRejection::InvalidCredentials)));
    }

    #[test]
    fn gate_rejections() {
        let gate = JwtGate::new(SECRET);
        assert_eq!(gate.authenticate(None), Err(AuthRejection::MissingOrMalformedHeader));
        assert_eq!(
            gate.authenticate(Some("Basic abc")),
            Err(AuthRejection::MissingOrMalformedHeader)
        );
        assert_eq!(gate.authenticate(Some("Bearer ")), Err(AuthRejection::MissingOrMalformedHeader));
        assert_eq!(
            gate.authenticate(Some("Bearer not.a.jwt")),
            Err(AuthRejection::InvalidOrExpiredToken)
        );

        let expired = issuer().issue(&account(), Utc::now() - Duration::hours(3)).unwrap();
        assert_eq!(
            gate.authenticate(Some(&format!("Bearer {}", expired.token))),
            Err(AuthRejection::InvalidOrExpiredToken)
        );

        let foreign = CredentialIssuer::new("other-secret", Duration::hours(1), vec![account()])
            .issue(&account(), Utc::now())
            .unwrap();
        assert_eq!(
            gate.authenticate(Some(&format!("bearer {}", foreign.token))),
            Err(AuthRejection::InvalidOrExpiredToken)
        );
    }
}
