use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::Credentials;
use crate::protocol::RtspRequest;

/// HTTP Basic authentication (RFC 2617 §2).
///
/// The credentials travel as `base64(username:password)` on every request.
#[derive(Debug, Clone)]
pub struct AuthenticationBasic {
    credentials: Credentials,
    realm: String,
}

impl AuthenticationBasic {
    pub fn new(credentials: Credentials, realm: impl Into<String>) -> Self {
        Self {
            credentials,
            realm: realm.into(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// `Basic <base64(username:password)>`
    pub fn get_response(&self) -> String {
        let token = format!("{}:{}", self.credentials.username, self.credentials.password);
        format!("Basic {}", BASE64_STANDARD.encode(token))
    }

    /// Username compares case-insensitively, password exactly.
    pub fn is_valid(&self, request: &RtspRequest) -> bool {
        let Some(value) = request.get_header("Authorization") else {
            return false;
        };
        let Some((scheme, token)) = value.trim().split_once(' ') else {
            return false;
        };
        if !scheme.eq_ignore_ascii_case("basic") {
            return false;
        }
        let Ok(decoded) = BASE64_STANDARD.decode(token.trim()) else {
            tracing::debug!("undecodable Basic credentials");
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((username, password)) => {
                username.eq_ignore_ascii_case(&self.credentials.username)
                    && password == self.credentials.password
            }
            None => false,
        }
    }

    pub fn www_authenticate(&self) -> String {
        format!("Basic realm=\"{}\"", self.realm)
    }
}
