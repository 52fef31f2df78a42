//! RTSP authentication (RFC 2617, as reused by RFC 2326 §19.6).
//!
//! A server answers an unauthenticated request with `401 Unauthorized` and
//! a `WWW-Authenticate` challenge; the client repeats the request with an
//! `Authorization` header:
//!
//! ```text
//! S->C  WWW-Authenticate: Digest realm="cam", nonce="4f1d..", qop="auth"
//! C->S  Authorization: Digest username="admin", realm="cam", nonce="4f1d..",
//!           uri="rtsp://cam/live", response="6629..", qop=auth,
//!           nc=00000001, cnonce="0a4f113b"
//! ```
//!
//! [`Authentication`] covers both directions: built from a challenge it
//! produces `Authorization` values, and built with
//! [`AuthenticationDigest::server`] or [`AuthenticationBasic::new`] it issues
//! challenges and validates incoming requests.

mod basic;
mod digest;

use std::collections::HashMap;

use md5::{Digest, Md5};

pub use basic::AuthenticationBasic;
pub use digest::{AuthenticationDigest, Qop};

use crate::error::{Result, RtspError};
use crate::protocol::RtspRequest;

/// Username and password for one camera or user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Authentication state for one connection.
#[derive(Debug, Clone)]
pub enum Authentication {
    Basic(AuthenticationBasic),
    Digest(AuthenticationDigest),
}

impl Authentication {
    /// Build a client from a `WWW-Authenticate` header value.
    ///
    /// The scheme is matched case-insensitively. Digest challenges must
    /// carry `realm` and `nonce`, and may only ask for MD5.
    pub fn from_challenge(credentials: Credentials, www_authenticate: &str) -> Result<Self> {
        let (scheme, params) = split_scheme(www_authenticate);
        if scheme.eq_ignore_ascii_case("basic") {
            let realm = parse_params(params).remove("realm").unwrap_or_default();
            Ok(Authentication::Basic(AuthenticationBasic::new(credentials, realm)))
        } else if scheme.eq_ignore_ascii_case("digest") {
            AuthenticationDigest::from_challenge(credentials, params).map(Authentication::Digest)
        } else {
            Err(RtspError::UnsupportedAuthentication(scheme.to_string()))
        }
    }

    /// `Authorization` value for a request with the given nonce count.
    ///
    /// Basic ignores everything but the credentials.
    pub fn get_response(&self, nonce_count: u32, uri: &str, method: &str, body: &[u8]) -> String {
        match self {
            Authentication::Basic(basic) => basic.get_response(),
            Authentication::Digest(digest) => digest.get_response(nonce_count, uri, method, body),
        }
    }

    /// Set the `Authorization` header on `request`, advancing the nonce count.
    pub fn authorize(&mut self, request: &mut RtspRequest) {
        let value = match self {
            Authentication::Basic(basic) => basic.get_response(),
            Authentication::Digest(digest) => {
                let nonce_count = digest.next_nonce_count();
                digest.get_response(nonce_count, &request.uri, request.method.as_str(), &request.body)
            }
        };
        request.headers.set("Authorization", value);
    }

    /// Check an incoming request's `Authorization` header.
    ///
    /// Never fails: a missing, malformed or wrong header is just `false`.
    pub fn is_valid(&self, request: &RtspRequest) -> bool {
        match self {
            Authentication::Basic(basic) => basic.is_valid(request),
            Authentication::Digest(digest) => digest.is_valid(request),
        }
    }

    /// `WWW-Authenticate` value for a 401 response.
    pub fn www_authenticate(&self) -> String {
        match self {
            Authentication::Basic(basic) => basic.www_authenticate(),
            Authentication::Digest(digest) => digest.www_authenticate(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        match self {
            Authentication::Basic(basic) => basic.credentials(),
            Authentication::Digest(digest) => digest.credentials(),
        }
    }
}

/// Split `Scheme params...` at the first whitespace.
fn split_scheme(value: &str) -> (&str, &str) {
    let value = value.trim();
    match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest.trim_start()),
        None => (value, ""),
    }
}

/// Parse `key=value, key="quoted, value"` lists. Keys are lower-cased,
/// surrounding quotes are removed.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut push = |part: &str| {
        if let Some((key, value)) = part.split_once('=') {
            params.insert(
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    };
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    push(&input[start..]);
    params
}

/// Lower-case hex MD5.
fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Md5::digest(data.as_ref()))
}
