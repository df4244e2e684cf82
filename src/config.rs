//! Process configuration from environment variables (after `.env` is loaded by the binary).

use crate::auth::StaffAccount;
use crate::error::ConfigError;
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_JWT_TTL_HOURS: i64 = 12;
pub const DEFAULT_REQUEST_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: SocketAddr,
    pub max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    /// Staff account allowed to log in. Without it every login is rejected.
    pub admin: Option<StaffAccount>,
    pub request_body_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let bind_address = parse_or("BIND_ADDRESS", get("BIND_ADDRESS"), || {
            DEFAULT_BIND_ADDRESS.parse().map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDRESS",
                reason: format!("{}", e),
            })
        })?;
        let max_connections = parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), || {
            Ok(DEFAULT_MAX_CONNECTIONS)
        })?;
        let jwt_ttl_hours = parse_or("JWT_TTL_HOURS", get("JWT_TTL_HOURS"), || Ok(DEFAULT_JWT_TTL_HOURS))?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_TTL_HOURS",
                reason: "must be positive".into(),
            });
        }
        let request_body_limit = parse_or("REQUEST_BODY_LIMIT", get("REQUEST_BODY_LIMIT"), || {
            Ok(DEFAULT_REQUEST_BODY_LIMIT)
        })?;

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD_SHA256")) {
            (Some(email), Some(digest)) => {
                if digest.len() != 64 || hex::decode(&digest).is_err() {
                    return Err(ConfigError::Invalid {
                        var: "ADMIN_PASSWORD_SHA256",
                        reason: "expected 64 hex characters".into(),
                    });
                }
                Some(StaffAccount {
                    name: get("ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
                    email: email.to_lowercase(),
                    role: "admin".into(),
                    password_sha256: digest.to_lowercase(),
                })
            }
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD_SHA256")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        Ok(AppConfig {
            database_url,
            bind_address,
            max_connections,
            jwt_secret,
            jwt_ttl_hours,
            admin,
            request_body_limit,
        })
    }
}

fn parse_or<T, D>(var: &'static str, raw: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, ConfigError>,
{
    match raw {
        Some(s) => s.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    const DIGEST: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/vet"), ("JWT_SECRET", "s3cret")]))
            .unwrap();
        assert_eq!(cfg.bind_address.to_string(), DEFAULT_BIND_ADDRESS);
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.jwt_ttl_hours, 12);
        assert_eq!(cfg.request_body_limit, 1024 * 1024);
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("DATABASE_URL", "x")])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "x"),
                ("JWT_SECRET", "s"),
                ("DATABASE_MAX_CONNECTIONS", "many")
            ])),
            Err(ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", .. })
        ));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "x"),
                ("JWT_SECRET", "s"),
                ("ADMIN_EMAIL", "a@b.lt")
            ])),
            Err(ConfigError::Missing("ADMIN_PASSWORD_SHA256"))
        ));
    }

    #[test]
    fn admin_account_is_normalized() {
        let upper = DIGEST.to_uppercase();
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "x"),
            ("JWT_SECRET", "s"),
            ("ADMIN_EMAIL", "Desk@Clinic.LT"),
            ("ADMIN_PASSWORD_SHA256", upper.as_str()),
        ]))
        .unwrap();
        let admin = cfg.admin.unwrap();
        assert_eq!(admin.email, "desk@clinic.lt");
        assert_eq!(admin.password_sha256, DIGEST);
        assert_eq!(admin.name, "Administrator");
    }
}
