//! HTTP Digest access authentication codec ([RFC 2617 §3.2](
//! https://datatracker.ietf.org/doc/html/rfc2617#section-3.2)).
//!
//! Parses and serializes the `WWW-Authenticate: Digest` and
//! `Authorization: Digest` header grammars and computes the MD5 response
//! hash for the `none`, `auth` and `auth-int` quality-of-protection modes.
//!
//! This module performs no verification: callers compare the computed
//! response against the one a client sent.

use md5::{Digest as _, Md5};
use std::collections::BTreeSet;

#[inline]
fn md5_hex(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[inline]
fn find_quoted<'a>(src: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{key}=\"");
    let start = src.find(&needle)? + needle.len();
    let end = start + src[start..].find('"')?;
    Some(&src[start..end])
}

#[inline]
fn find_bare<'a>(src: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{key}=");
    let pos = src.find(needle.as_str())?;
    let start = pos + needle.len();

    // Don't match a bare token that is actually the tail of a longer
    // key (e.g. `qop=` inside `nc=`): make sure the preceding byte is
    // a separator or start-of-string.
    if pos > 0 {
        let prev = src.as_bytes()[pos - 1];
        if prev != b',' && prev != b' ' {
            return None;
        }
    }

    let rest = &src[start..];
    let end = rest.find(',').map(|i| start + i).unwrap_or(src.len());
    Some(src[start..end].trim())
}

/// The `Authorization: Digest` request header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDigest {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub algorithm: String,
    pub nc: u32,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
    pub qop: Option<String>,
}

impl AuthorizationDigest {
    /// Parses the value of an `Authorization: Digest ...` header.
    ///
    /// Returns `None` when `username`, `realm`, `nonce`, `uri` or
    /// `response` is missing, or when `qop` is `auth`/`auth-int` but
    /// `cnonce`/`nc` is absent or malformed.
    pub fn parse(src: &str) -> Option<Self> {
        let username = find_quoted(src, "username")?.to_owned();
        let realm = find_quoted(src, "realm")?.to_owned();
        let nonce = find_quoted(src, "nonce")?.to_owned();
        let uri = find_quoted(src, "uri")?.to_owned();
        let response = find_quoted(src, "response")?.to_owned();

        let algorithm = find_bare(src, "algorithm")
            .map(str::to_owned)
            .unwrap_or_else(|| "MD5".to_owned());
        let opaque = find_quoted(src, "opaque").map(str::to_owned);
        let qop = find_bare(src, "qop").map(str::to_owned);

        let (cnonce, nc) = match qop.as_deref() {
            Some("auth") | Some("auth-int") => {
                let cnonce = find_quoted(src, "cnonce")?.to_owned();
                let nc_hex = find_bare(src, "nc")?;
                let nc = u32::from_str_radix(nc_hex, 16).ok()?;
                (Some(cnonce), nc)
            }
            _ => (None, 0),
        };

        Some(Self {
            username,
            realm,
            nonce,
            uri,
            response,
            algorithm,
            nc,
            cnonce,
            opaque,
            qop,
        })
    }

    /// Serializes back into an `Authorization: Digest ...` header value,
    /// tokens ordered per §6: username, realm, nonce, uri, response,
    /// algorithm?, cnonce?, opaque?, qop?, nc?.
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.username, self.realm, self.nonce, self.uri, self.response,
        );

        if !self.algorithm.is_empty() {
            out.push_str(", algorithm=");
            out.push_str(&self.algorithm);
        }
        if let Some(cnonce) = &self.cnonce {
            out.push_str(", cnonce=\"");
            out.push_str(cnonce);
            out.push('"');
        }
        if let Some(opaque) = &self.opaque {
            out.push_str(", opaque=\"");
            out.push_str(opaque);
            out.push('"');
        }
        if let Some(qop) = &self.qop {
            out.push_str(", qop=");
            out.push_str(qop);
        }
        if self.nc > 0 {
            out.push_str(&format!(", nc={:08x}", self.nc));
        }
        out
    }
}

/// The `WWW-Authenticate: Digest` challenge header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WwwAuthenticateDigest {
    pub stale: bool,
    pub realm: String,
    pub nonce: String,
    pub algorithm: String,
    pub domains: Vec<String>,
    pub opaque: Option<String>,
    pub qop_set: BTreeSet<String>,
}

impl WwwAuthenticateDigest {
    /// Parses the value of a `WWW-Authenticate: Digest ...` header.
    ///
    /// Returns `None` when `realm` or `nonce` is missing; a missing
    /// `algorithm` defaults to `MD5`.
    pub fn parse(src: &str) -> Option<Self> {
        let realm = find_quoted(src, "realm")?.to_owned();
        let nonce = find_quoted(src, "nonce")?.to_owned();

        let domains = find_quoted(src, "domain")
            .map(|group| {
                group
                    .split(' ')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let opaque = find_quoted(src, "opaque").map(str::to_owned);

        let algorithm = find_bare(src, "algorithm")
            .map(str::to_owned)
            .unwrap_or_else(|| "MD5".to_owned());

        let stale = find_bare(src, "stale")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let qop_set = find_quoted(src, "qop")
            .map(|group| {
                group
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            stale,
            realm,
            nonce,
            algorithm,
            domains,
            opaque,
            qop_set,
        })
    }

    /// Serializes back into a `WWW-Authenticate: Digest ...` header value,
    /// tokens ordered per §6: realm, nonce, algorithm?, domain?, opaque?,
    /// qop?, stale (emitted only when `true`).
    pub fn serialize(&self) -> String {
        let mut out = format!("Digest realm=\"{}\", nonce=\"{}\"", self.realm, self.nonce);

        if !self.algorithm.is_empty() {
            out.push_str(", algorithm=");
            out.push_str(&self.algorithm);
        }
        if !self.domains.is_empty() {
            out.push_str(", domain=\"");
            out.push_str(&self.domains.join(" "));
            out.push('"');
        }
        if let Some(opaque) = &self.opaque {
            out.push_str(", opaque=\"");
            out.push_str(opaque);
            out.push('"');
        }
        if !self.qop_set.is_empty() {
            out.push_str(", qop=\"");
            let joined = self.qop_set.iter().cloned().collect::<Vec<_>>().join(",");
            out.push_str(&joined);
            out.push('"');
        }
        if self.stale {
            out.push_str(", stale=true");
        }
        out
    }

    /// `H(A1) = MD5(username:realm:password)`.
    #[inline]
    fn ha1(&self, username: &str, password: &str) -> String {
        md5_hex(format!("{username}:{}:{password}", self.realm).as_bytes())
    }

    /// Computes the Digest `response` value for the unqualified (no `qop`)
    /// formula: `MD5(H(A1):nonce:MD5(method:uri))`.
    pub fn make_response(&self, username: &str, password: &str, method: &str, uri: &str) -> String {
        let ha1 = self.ha1(username, password);
        let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
        md5_hex(format!("{ha1}:{}:{ha2}", self.nonce).as_bytes())
    }

    /// Computes the Digest `response` value for `qop=auth`:
    /// `MD5(H(A1):nonce:NC:cnonce:"auth":MD5(method:uri))`, `NC` an
    /// 8-digit lowercase hex counter.
    pub fn make_response_auth(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let ha1 = self.ha1(username, password);
        let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
        md5_hex(format!("{ha1}:{}:{nc:08x}:{cnonce}:auth:{ha2}", self.nonce).as_bytes())
    }

    /// Computes the Digest `response` value for `qop=auth-int`:
    /// `MD5(H(A1):nonce:NC:cnonce:"auth-int":MD5(method:uri:MD5(body)))`.
    pub fn make_response_auth_int(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        body: &[u8],
        nc: u32,
        cnonce: &str,
    ) -> String {
        let ha1 = self.ha1(username, password);
        let body_hash = md5_hex(body);
        let ha2 = md5_hex(format!("{method}:{uri}:{body_hash}").as_bytes());
        md5_hex(format!("{ha1}:{}:{nc:08x}:{cnonce}:auth-int:{ha2}", self.nonce).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn www_authenticate_round_trip() {
        let src = r#"Digest realm="x", nonce="n", qop="auth", algorithm=MD5"#;
        let parsed = WwwAuthenticateDigest::parse(src).unwrap();

        assert_eq!(parsed.realm, "x");
        assert_eq!(parsed.nonce, "n");
        assert_eq!(parsed.algorithm, "MD5");
        assert_eq!(parsed.qop_set, BTreeSet::from(["auth".to_owned()]));

        let again = WwwAuthenticateDigest::parse(&parsed.serialize()).unwrap();
        assert_eq!(parsed, again);
    }

    #[test]
    fn www_authenticate_requires_realm_and_nonce() {
        assert!(WwwAuthenticateDigest::parse("Digest nonce=\"n\"").is_none());
        assert!(WwwAuthenticateDigest::parse("Digest realm=\"r\"").is_none());
    }

    #[test]
    fn www_authenticate_trims_domain_whitespace() {
        let src = r#"Digest realm="x", nonce="n", domain="  /a   /b  ""#;
        let parsed = WwwAuthenticateDigest::parse(src).unwrap();
        assert_eq!(parsed.domains, vec!["/a".to_owned(), "/b".to_owned()]);
    }

    #[test]
    fn authorization_round_trip() {
        let digest = AuthorizationDigest {
            username: "u".into(),
            realm: "r".into(),
            nonce: "n".into(),
            uri: "/a".into(),
            response: "deadbeef".into(),
            algorithm: "MD5".into(),
            nc: 1,
            cnonce: Some("c".into()),
            opaque: Some("o".into()),
            qop: Some("auth".into()),
        };

        let again = AuthorizationDigest::parse(&digest.serialize()).unwrap();
        assert_eq!(digest, again);
    }

    #[test]
    fn authorization_requires_cnonce_and_nc_for_qop_auth() {
        let src = r#"Digest username="u", realm="r", nonce="n", uri="/a", response="x", qop=auth"#;
        assert!(AuthorizationDigest::parse(src).is_none());
    }

    #[test]
    fn response_computation_no_qop() {
        let www = WwwAuthenticateDigest {
            stale: false,
            realm: "r".into(),
            nonce: "n".into(),
            algorithm: "MD5".into(),
            domains: vec![],
            opaque: None,
            qop_set: BTreeSet::new(),
        };

        let ha1 = md5_hex(b"u:r:p");
        let ha2 = md5_hex(b"POST:/a");
        let expected = md5_hex(format!("{ha1}:n:{ha2}").as_bytes());

        assert_eq!(www.make_response("u", "p", "POST", "/a"), expected);
    }

    #[test]
    fn response_computation_qop_auth() {
        let www = WwwAuthenticateDigest {
            stale: false,
            realm: "r".into(),
            nonce: "n".into(),
            algorithm: "MD5".into(),
            domains: vec![],
            opaque: None,
            qop_set: BTreeSet::from(["auth".to_owned()]),
        };

        let ha1 = md5_hex(b"u:r:p");
        let ha2 = md5_hex(b"POST:/a");
        let expected = md5_hex(format!("{ha1}:n:00000001:c:auth:{ha2}").as_bytes());

        assert_eq!(www.make_response_auth("u", "p", "POST", "/a", 1, "c"), expected);
    }

    #[test]
    fn response_computation_qop_auth_int_uses_correct_tag() {
        let www = WwwAuthenticateDigest {
            stale: false,
            realm: "r".into(),
            nonce: "n".into(),
            algorithm: "MD5".into(),
            domains: vec![],
            opaque: None,
            qop_set: BTreeSet::from(["auth-int".to_owned()]),
        };

        let ha1 = md5_hex(b"u:r:p");
        let body_hash = md5_hex(b"body");
        let ha2 = md5_hex(format!("POST:/a:{body_hash}").as_bytes());
        let expected = md5_hex(format!("{ha1}:n:00000001:c:auth-int:{ha2}").as_bytes());

        assert_eq!(
            www.make_response_auth_int("u", "p", "POST", "/a", b"body", 1, "c"),
            expected
        );
    }

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
