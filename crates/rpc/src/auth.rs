//! Bearer-token authorization for incoming calls.

use std::fmt;

use filestream_protocol::constants::{AUTHORIZATION_KEY, BEARER_SCHEME};
use filestream_protocol::{Metadata, Status};
use tracing::debug;

use crate::interceptor::{CallFuture, Interceptor, Next, ServerCall};

/// Credentials extracted from an authorized call.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    token: String,
}

impl AuthContext {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Validates a received token against the expected value.
///
/// Uses constant-time comparison to prevent timing attacks.
pub fn validate_token(received: &str, expected: &str) -> bool {
    if received.len() != expected.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in received.bytes().zip(expected.bytes()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Checks `authorization: Bearer <token>` in `metadata` against `expected`.
pub fn authorize(metadata: &Metadata, expected: &str) -> Result<AuthContext, Status> {
    let value = metadata
        .get(AUTHORIZATION_KEY)
        .ok_or_else(|| Status::unauthenticated("missing authorization metadata"))?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| Status::unauthenticated("malformed authorization metadata"))?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(Status::unauthenticated(format!(
            "unsupported authorization scheme: {scheme}"
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(Status::unauthenticated("empty bearer token"));
    }
    if expected.is_empty() || !validate_token(token, expected) {
        return Err(Status::unauthenticated("invalid token"));
    }

    Ok(AuthContext {
        token: token.to_string(),
    })
}

/// Rejects calls without a valid bearer token before any handler runs.
pub struct AuthInterceptor {
    expected: String,
}

impl AuthInterceptor {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn intercept<'a>(&'a self, mut call: ServerCall, next: Next<'a>) -> CallFuture<'a> {
        Box::pin(async move {
            let auth = authorize(&call.metadata, &self.expected)?;
            debug!(method = %call.method, "call authorized");
            call.auth = Some(auth);
            next.run(call).await
        })
    }
}

#[cfg(test)]
mod tests {
    use filestream_protocol::Code;

    use super::*;

    fn md(value: &str) -> Metadata {
        let mut md = Metadata::new();
        md.insert("Authorization", value);
        md
    }

    #[test]
    fn accepts_matching_bearer() {
        let ctx = authorize(&Metadata::with_bearer("test-token"), "test-token").unwrap();
        assert_eq!(ctx.token(), "test-token");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(authorize(&md("bearer test-token"), "test-token").is_ok());
        assert!(authorize(&md("BEARER  test-token "), "test-token").is_ok());
    }

    #[test]
    fn rejections_are_unauthenticated() {
        let cases = [
            Metadata::new(),
            md("test-token"),
            md("Basic test-token"),
            md("Bearer "),
            md("Bearer wrong-token"),
            md("Bearer test-tokenx"),
        ];
        for metadata in cases {
            let err = authorize(&metadata, "test-token").unwrap_err();
            assert_eq!(err.code, Code::Unauthenticated, "{metadata:?}");
        }
    }

    #[test]
    fn empty_expected_token_rejects_everything() {
        let err = authorize(&md("Bearer x"), "").unwrap_err();
        assert_eq!(err.code, Code::Unauthenticated);
    }

    #[test]
    fn debug_redacts_token() {
        let ctx = authorize(&Metadata::with_bearer("s3cret"), "s3cret").unwrap();
        assert!(!format!("{ctx:?}").contains("s3cret"));
    }

    #[test]
    fn validate_different_lengths() {
        assert!(!validate_token("short", "this_is_longer"));
        assert!(validate_token("same", "same"));
        assert!(!validate_token("same", "sane"));
    }
}
