use crate::error::{Error, Result};
use chrono::{Months, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Issuer the REST layer and gateway expect on API keys.
pub const JWT_ISSUER: &str = "supabase";
/// Token lifetime advertised to the database (`JWT_EXP`), in seconds.
pub const JWT_EXP_SECS: u32 = 3600;

/// Generate a random 32-character alphanumeric secret.
pub fn generate_secret() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyClaims {
    pub role: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Per-run credentials. Passed to containers only through their environment.
#[derive(Clone)]
pub struct Secrets {
    pub db_password: String,
    pub jwt_secret: String,
    /// HS256 token for the `anon` role.
    pub anon_key: String,
    /// HS256 token for the `service_role` role.
    pub service_key: String,
}

impl Secrets {
    pub fn generate() -> Result<Self> {
        let jwt_secret = generate_secret();
        let anon_key = sign_api_key("anon", &jwt_secret)?;
        let service_key = sign_api_key("service_role", &jwt_secret)?;
        Ok(Self {
            db_password: generate_secret(),
            jwt_secret,
            anon_key,
            service_key,
        })
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("db_password", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("anon_key", &"<redacted>")
            .field("service_key", &"<redacted>")
            .finish()
    }
}

/// Long-lived (10 year) API key for `role`.
pub fn sign_api_key(role: &str, secret: &str) -> Result<String> {
    let now = Utc::now();
    let exp = now
        .checked_add_months(Months::new(120))
        .ok_or_else(|| Error::Config("API key expiry overflows the calendar".to_string()))?;
    let claims = ApiKeyClaims {
        role: role.to_string(),
        iss: JWT_ISSUER.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[test]
    fn generate_secret_shape() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn api_keys_verify_against_secret() {
        let secrets = Secrets::generate().unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[JWT_ISSUER]);

        let key = DecodingKey::from_secret(secrets.jwt_secret.as_bytes());
        let anon = decode::<ApiKeyClaims>(&secrets.anon_key, &key, &validation).unwrap();
        assert_eq!(anon.claims.role, "anon");
        let service = decode::<ApiKeyClaims>(&secrets.service_key, &key, &validation).unwrap();
        assert_eq!(service.claims.role, "service_role");

        // roughly ten years
        let lifetime = anon.claims.exp - anon.claims.iat;
        assert!(lifetime > 9 * 365 * 24 * 3600);
    }

    #[test]
    fn debug_never_prints_values() {
        let secrets = Secrets::generate().unwrap();
        let rendered = format!("{:?}", secrets);
        assert!(!rendered.contains(&secrets.db_password));
        assert!(!rendered.contains(&secrets.jwt_secret));
    }
}
