use std::fmt;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;

use super::{Claims, RequestValidator, TokenError};
use crate::request::Request;

/// Validates `Authorization: Bearer <jwt>` tokens signed with HS256.
///
/// Signature, issuer, audience and expiry are all checked.
#[derive(Clone)]
pub struct Hs256Validator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256Validator {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }
}

impl fmt::Debug for Hs256Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hs256Validator")
            .field("key", &"[hidden]")
            .field("validation", &self.validation)
            .finish()
    }
}

/// The bearer token of the `Authorization` header.
fn bearer_token(req: &Request) -> Result<&str, TokenError> {
    let value = match req.headers().get(AUTHORIZATION) {
        None => return Err(TokenError::NotFound),
        Some(value) => value
            .to_str()
            .map_err(|_| TokenError::Invalid("authorization header is not ASCII".to_owned()))?,
    };
    if value.is_empty() {
        return Err(TokenError::NotFound);
    }
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(token)
        }
        _ => Err(TokenError::Invalid(
            "authorization header format must be Bearer {token}".to_owned(),
        )),
    }
}

#[async_trait]
impl RequestValidator for Hs256Validator {
    /// The verified claim set, still untyped.
    type Token = Value;

    async fn validate_request(&self, req: &Request) -> Result<Value, TokenError> {
        let token = bearer_token(req)?;
        decode::<Value>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }

    async fn claims(&self, _req: &Request, token: &Value) -> Result<Claims, TokenError> {
        serde_json::from_value(token.clone()).map_err(|e| TokenError::Claims(e.to_string()))
    }
}
