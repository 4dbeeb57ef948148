//! Credential checks for inbound requests.
//!
//! Webhooks are signed with `X-Signature: sha1=<hex hmac-sha1(secret, body)>`.
//! Reverse WebSocket handshakes carry `Authorization: Bearer <token>` (or the
//! legacy `Token <token>` form).

use std::sync::LazyLock;

use anybot_core::AuthError;
use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use regex::Regex;
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

static AUTHORIZATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[Tt]oken|[Bb]earer) (\S+)$").expect("valid authorization regex")
});

/// Computes the `X-Signature` value expected for `body`.
pub fn signature(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks a webhook signature header against `secret`.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    let expected = signature(secret, body).ok_or(AuthError::InvalidCredential)?;
    if bool::from(expected.as_bytes().ct_eq(header.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredential)
    }
}

/// Extracts the token from an `Authorization` header value.
pub fn parse_authorization(header: &str) -> Option<&str> {
    AUTHORIZATION_RE
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Checks a handshake `Authorization` header against `access_token`.
pub fn verify_access_token(access_token: &str, header: Option<&str>) -> Result<(), AuthError> {
    let token = header
        .and_then(parse_authorization)
        .ok_or(AuthError::MissingCredential)?;
    if bool::from(token.as_bytes().ct_eq(access_token.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredential)
    }
}

/// HTTP status an authentication failure is answered with.
pub fn rejection_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingCredential => StatusCode::UNAUTHORIZED,
        AuthError::InvalidCredential => StatusCode::FORBIDDEN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED_EMPTY_OBJECT: &str = "sha1=f717d461cefc70d136e3e49fbcb90ce682c31fb8";

    #[test]
    fn test_signature_matches_known_vector() {
        assert_eq!(signature("s3cr3t", b"{}").as_deref(), Some(SIGNED_EMPTY_OBJECT));
    }

    #[test]
    fn test_verify_signature() {
        assert_eq!(
            verify_signature("s3cr3t", b"{}", Some(SIGNED_EMPTY_OBJECT)),
            Ok(())
        );
        assert_eq!(
            verify_signature("s3cr3t", b"{}", Some("sha1=0000")),
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(
            verify_signature("s3cr3t", b"{ }", Some(SIGNED_EMPTY_OBJECT)),
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(
            verify_signature("s3cr3t", b"{}", None),
            Err(AuthError::MissingCredential)
        );
    }

    #[test]
    fn test_parse_authorization_forms() {
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Token abc"), Some("abc"));
        assert_eq!(parse_authorization("token abc"), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Bearer"), None);
        assert_eq!(parse_authorization("Bearer a b"), None);
    }

    #[test]
    fn test_verify_access_token() {
        assert_eq!(verify_access_token("abc", Some("Bearer abc")), Ok(()));
        assert_eq!(
            verify_access_token("abc", Some("Bearer xyz")),
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(
            verify_access_token("abc", Some("abc")),
            Err(AuthError::MissingCredential)
        );
        assert_eq!(
            verify_access_token("abc", None),
            Err(AuthError::MissingCredential)
        );
    }

    #[test]
    fn test_rejection_status() {
        assert_eq!(
            rejection_status(&AuthError::MissingCredential),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            rejection_status(&AuthError::InvalidCredential),
            StatusCode::FORBIDDEN
        );
    }
}
