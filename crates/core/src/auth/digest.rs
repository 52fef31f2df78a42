use rand::RngExt as _;

use super::{Credentials, md5_hex, parse_params};
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::RtspRequest;

/// Digest quality of protection (RFC 2617 §3.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
    /// Integrity protection: the body hash is part of HA2.
    AuthInt,
}

impl Qop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            t if t.eq_ignore_ascii_case("auth") => Some(Qop::Auth),
            t if t.eq_ignore_ascii_case("auth-int") => Some(Qop::AuthInt),
            _ => None,
        }
    }
}

/// HTTP Digest authentication (RFC 2617 §3), MD5 only.
///
/// ```text
/// HA1      = MD5(username:realm:password)
/// HA2      = MD5(method:uri)                  qop absent or "auth"
///          = MD5(method:uri:MD5(body))        qop = "auth-int"
/// response = MD5(HA1:nonce:HA2)               qop absent
///          = MD5(HA1:nonce:nc:cnonce:qop:HA2) qop present
/// ```
///
/// The client nonce is chosen once per instance. The nonce count must
/// strictly increase for each request under the same server nonce;
/// [`next_nonce_count`](Self::next_nonce_count) hands out the values.
#[derive(Debug, Clone)]
pub struct AuthenticationDigest {
    credentials: Credentials,
    realm: String,
    nonce: String,
    opaque: Option<String>,
    qop: Option<Qop>,
    /// Echoed back when the challenge named it.
    algorithm: Option<String>,
    cnonce: String,
    nonce_count: u32,
}

impl AuthenticationDigest {
    /// Build a client from the parameter part of a Digest challenge.
    pub fn from_challenge(credentials: Credentials, params: &str) -> Result<Self> {
        let mut params = parse_params(params);

        let algorithm = params.remove("algorithm");
        if let Some(alg) = &algorithm
            && !alg.eq_ignore_ascii_case("MD5")
        {
            return Err(RtspError::UnsupportedAuthentication(format!(
                "Digest algorithm {alg}"
            )));
        }

        let (Some(realm), Some(nonce)) = (params.remove("realm"), params.remove("nonce")) else {
            return Err(RtspError::parse(ParseErrorKind::InvalidAuthenticationHeader));
        };

        let qop = match params.remove("qop") {
            None => None,
            Some(offered_raw) => {
                let offered: Vec<Qop> =
                    offered_raw.split(',').filter_map(Qop::from_token).collect();
                if offered.contains(&Qop::Auth) {
                    Some(Qop::Auth)
                } else if offered.contains(&Qop::AuthInt) {
                    Some(Qop::AuthInt)
                } else {
                    tracing::warn!(qop = %offered_raw, "challenge offers no known qop");
                    return Err(RtspError::parse(ParseErrorKind::InvalidAuthenticationHeader));
                }
            }
        };

        Ok(Self {
            credentials,
            realm,
            nonce,
            opaque: params.remove("opaque"),
            qop,
            algorithm,
            cnonce: random_hex_u64(),
            nonce_count: 0,
        })
    }

    /// Server-side instance that issues a fresh random nonce.
    pub fn server(credentials: Credentials, realm: impl Into<String>) -> Self {
        Self {
            credentials,
            realm: realm.into(),
            nonce: format!("{:032x}", rand::rng().random::<u128>()),
            opaque: None,
            qop: None,
            algorithm: None,
            cnonce: String::new(),
            nonce_count: 0,
        }
    }

    /// Offer a quality of protection in the challenge.
    pub fn with_qop(mut self, qop: Qop) -> Self {
        self.qop = Some(qop);
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn qop(&self) -> Option<Qop> {
        self.qop
    }

    pub fn cnonce(&self) -> &str {
        &self.cnonce
    }

    /// Advance and return the nonce count for the next request.
    ///
    /// Wraps after `u32::MAX`; a server will have issued a new nonce long
    /// before that.
    pub fn next_nonce_count(&mut self) -> u32 {
        self.nonce_count = self.nonce_count.wrapping_add(1);
        self.nonce_count
    }

    /// `Authorization` header value for one request.
    pub fn get_response(&self, nonce_count: u32, uri: &str, method: &str, body: &[u8]) -> String {
        let nc = format!("{nonce_count:08x}");
        let response = self.compute(
            &self.credentials.username,
            self.qop.map(|qop| (qop, nc.as_str(), self.cnonce.as_str())),
            uri,
            method,
            body,
        );

        let mut params = vec![
            format!("username=\"{}\"", self.credentials.username),
            format!("realm=\"{}\"", self.realm),
            format!("nonce=\"{}\"", self.nonce),
            format!("uri=\"{uri}\""),
            format!("response=\"{response}\""),
        ];
        if let Some(opaque) = &self.opaque {
            params.push(format!("opaque=\"{opaque}\""));
        }
        if let Some(algorithm) = &self.algorithm {
            params.push(format!("algorithm={algorithm}"));
        }
        if let Some(qop) = self.qop {
            params.push(format!("qop={}", qop.as_str()));
            params.push(format!("nc={nc}"));
            params.push(format!("cnonce=\"{}\"", self.cnonce));
        }
        format!("Digest {}", params.join(", "))
    }

    /// Check the request's `Authorization` header against our credentials
    /// and the nonce we issued.
    ///
    /// Stateless: a replayed `nc` value is accepted. Replay protection, if
    /// wanted, belongs to the caller (for example by rotating the nonce).
    pub fn is_valid(&self, request: &RtspRequest) -> bool {
        let Some(value) = request.get_header("Authorization") else {
            return false;
        };
        let (scheme, rest) = super::split_scheme(value);
        if !scheme.eq_ignore_ascii_case("digest") {
            return false;
        }
        let params = parse_params(rest);
        let field = |name: &str| params.get(name).map(String::as_str);

        let (Some(username), Some(realm), Some(nonce), Some(uri), Some(response)) = (
            field("username"),
            field("realm"),
            field("nonce"),
            field("uri"),
            field("response"),
        ) else {
            tracing::debug!("Digest authorization is missing fields");
            return false;
        };

        if !username.eq_ignore_ascii_case(&self.credentials.username)
            || realm != self.realm
            || nonce != self.nonce
            || uri != request.uri
        {
            return false;
        }

        let protection = match field("qop") {
            None => None,
            Some(token) => {
                let (Some(qop), Some(nc), Some(cnonce)) =
                    (Qop::from_token(token), field("nc"), field("cnonce"))
                else {
                    return false;
                };
                Some((qop, nc, cnonce))
            }
        };

        let expected = self.compute(
            username,
            protection,
            uri,
            request.method.as_str(),
            &request.body,
        );
        expected.eq_ignore_ascii_case(response)
    }

    /// `WWW-Authenticate` value for a 401 response.
    pub fn www_authenticate(&self) -> String {
        let mut value = format!("Digest realm=\"{}\", nonce=\"{}\"", self.realm, self.nonce);
        if let Some(opaque) = &self.opaque {
            value.push_str(&format!(", opaque=\"{opaque}\""));
        }
        if let Some(qop) = self.qop {
            value.push_str(&format!(", qop=\"{}\"", qop.as_str()));
        }
        value
    }

    fn compute(
        &self,
        username: &str,
        protection: Option<(Qop, &str, &str)>,
        uri: &str,
        method: &str,
        body: &[u8],
    ) -> String {
        let ha1 = md5_hex(format!("{username}:{}:{}", self.realm, self.credentials.password));
        let ha2 = match protection {
            Some((Qop::AuthInt, _, _)) => md5_hex(format!("{method}:{uri}:{}", md5_hex(body))),
            _ => md5_hex(format!("{method}:{uri}")),
        };
        match protection {
            Some((qop, nc, cnonce)) => md5_hex(format!(
                "{ha1}:{}:{nc}:{cnonce}:{}:{ha2}",
                self.nonce,
                qop.as_str()
            )),
            None => md5_hex(format!("{ha1}:{}:{ha2}", self.nonce)),
        }
    }
}

fn random_hex_u64() -> String {
    format!("{:016x}", rand::rng().random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Method;

    const RFC_CHALLENGE: &str = r#"realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    fn mufasa() -> Credentials {
        Credentials::new("Mufasa", "Circle Of Life")
    }

    #[test]
    fn rfc2617_example() {
        let mut digest = AuthenticationDigest::from_challenge(mufasa(), RFC_CHALLENGE).unwrap();
        assert_eq!(digest.qop(), Some(Qop::Auth));
        digest.cnonce = "0a4f113b".to_string();

        let value = digest.get_response(1, "/dir/index.html", "GET", b"");
        assert!(value.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(value.contains("nc=00000001"));
        assert!(value.contains(r#"cnonce="0a4f113b""#));
        assert!(value.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }

    #[test]
    fn response_without_qop() {
        let digest = AuthenticationDigest::from_challenge(
            Credentials::new("admin", "12345"),
            r#"realm="IP Camera", nonce="b5a2f9""#,
        )
        .unwrap();
        let value = digest.get_response(1, "rtsp://10.0.0.5/live", "DESCRIBE", b"");

        let ha1 = md5_hex("admin:IP Camera:12345");
        let ha2 = md5_hex("DESCRIBE:rtsp://10.0.0.5/live");
        let expected = md5_hex(format!("{ha1}:b5a2f9:{ha2}"));
        assert!(value.contains(&format!("response=\"{expected}\"")));
        assert!(!value.contains("nc="));
        assert!(!value.contains("cnonce"));
    }

    #[test]
    fn nonce_count_changes_response_not_cnonce() {
        let digest = AuthenticationDigest::from_challenge(mufasa(), RFC_CHALLENGE).unwrap();
        let first = digest.get_response(1, "rtsp://cam/live", "PLAY", b"");
        let second = digest.get_response(2, "rtsp://cam/live", "PLAY", b"");

        let response = |v: &str| parse_params(v.trim_start_matches("Digest "))["response"].clone();
        let cnonce = |v: &str| parse_params(v.trim_start_matches("Digest "))["cnonce"].clone();
        assert_eq!(cnonce(&first), cnonce(&second));
        assert_ne!(response(&first), response(&second));
    }

    #[test]
    fn auth_int_hashes_body() {
        let digest = AuthenticationDigest::from_challenge(
            mufasa(),
            r#"realm="r", nonce="n", qop="auth-int""#,
        )
        .unwrap();
        assert_eq!(digest.qop(), Some(Qop::AuthInt));
        let a = digest.get_response(1, "rtsp://cam/p", "SET_PARAMETER", b"x: 1\r\n");
        let b = digest.get_response(1, "rtsp://cam/p", "SET_PARAMETER", b"x: 2\r\n");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_bad_challenges() {
        let err = AuthenticationDigest::from_challenge(mufasa(), r#"realm="r""#).unwrap_err();
        assert!(matches!(
            err,
            RtspError::Parse {
                kind: ParseErrorKind::InvalidAuthenticationHeader
            }
        ));

        let err = AuthenticationDigest::from_challenge(
            mufasa(),
            r#"realm="r", nonce="n", algorithm=SHA-256"#,
        )
        .unwrap_err();
        assert!(matches!(err, RtspError::UnsupportedAuthentication(_)));

        let err = AuthenticationDigest::from_challenge(
            mufasa(),
            r#"realm="r", nonce="n", qop="auth-conf,token""#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RtspError::Parse {
                kind: ParseErrorKind::InvalidAuthenticationHeader
            }
        ));
    }

    #[test]
    fn nonce_count_wraps_instead_of_overflowing() {
        let mut auth =
            AuthenticationDigest::from_challenge(mufasa(), r#"realm="r", nonce="n", qop="auth""#)
                .unwrap();
        auth.nonce_count = u32::MAX - 1;
        assert_eq!(auth.next_nonce_count(), u32::MAX);
        assert_eq!(auth.next_nonce_count(), 0);
    }

    #[test]
    fn server_validates_client() {
        let creds = Credentials::new("admin", "secret");
        let server = AuthenticationDigest::server(creds.clone(), "cam").with_qop(Qop::Auth);
        assert_eq!(server.nonce().len(), 32);

        let mut client =
            AuthenticationDigest::from_challenge(creds, &server.www_authenticate()["Digest ".len()..])
                .unwrap();
        let uri = "rtsp://cam/live";
        let nc = client.next_nonce_count();
        let request = RtspRequest::new(Method::Describe, uri)
            .add_header("Authorization", &client.get_response(nc, uri, "DESCRIBE", b""));
        assert!(server.is_valid(&request));

        // Wrong method, uri or password all fail.
        let wrong_method = RtspRequest::new(Method::Play, uri)
            .add_header("Authorization", request.get_header("Authorization").unwrap());
        assert!(!server.is_valid(&wrong_method));

        let wrong_uri = RtspRequest::new(Method::Describe, "rtsp://cam/other")
            .add_header("Authorization", request.get_header("Authorization").unwrap());
        assert!(!server.is_valid(&wrong_uri));

        let impostor = AuthenticationDigest::from_challenge(
            Credentials::new("admin", "Secret"),
            &server.www_authenticate()["Digest ".len()..],
        )
        .unwrap();
        let forged = RtspRequest::new(Method::Describe, uri)
            .add_header("Authorization", &impostor.get_response(1, uri, "DESCRIBE", b""));
        assert!(!server.is_valid(&forged));
    }

    #[test]
    fn server_without_qop() {
        let creds = Credentials::new("viewer", "pw");
        let server = AuthenticationDigest::server(creds.clone(), "cam");
        let client =
            AuthenticationDigest::from_challenge(creds, &server.www_authenticate()["Digest ".len()..])
                .unwrap();
        let request = RtspRequest::new(Method::Options, "*")
            .add_header("Authorization", &client.get_response(1, "*", "OPTIONS", b""));
        assert!(server.is_valid(&request));

        let stale = AuthenticationDigest::server(Credentials::new("viewer", "pw"), "cam");
        assert!(!stale.is_valid(&request));
    }
}
