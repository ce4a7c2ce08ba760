//! HTTP Signatures
//!
//! Implements the draft-cavage HTTP Signature scheme as federated
//! servers actually speak it: RSA-SHA256 over a line-oriented signing
//! string assembled from a declared header list.
//!
//! The header list is load-bearing. Each declared token contributes
//! exactly one `name: value` line, in declared order, with an empty
//! value when the header is absent; `(request-target)` expands to the
//! lowercased method and path.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::HeaderMap;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::AppError;

/// Headers signed on outbound POSTs, and the inbound POST allow-list.
pub const POST_SIGNED_HEADERS: &str = "host date digest content-type (request-target)";

/// Headers signed on outbound GETs, and the inbound GET allow-list.
pub const GET_SIGNED_HEADERS: &str = "host date digest (request-target)";

/// Build the signing string for a declared header list.
///
/// Tokens outside the supported set contribute an empty line rather
/// than being omitted, so both ends always agree on line count.
pub fn signing_string(
    host: &str,
    method: &str,
    path: &str,
    header_list: &str,
    headers: &HeaderMap,
) -> String {
    let mut lines = Vec::new();
    for token in header_list.split(' ') {
        let line = match token {
            "host" => format!("host: {host}"),
            "date" | "digest" | "content-type" => {
                let value = headers
                    .get(token)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                format!("{token}: {value}")
            }
            "(request-target)" => {
                format!("(request-target): {} {}", method.to_lowercase(), path)
            }
            // not supporting any other headers for now
            _ => String::new(),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Sign a signing string with the site key. Returns base64.
pub fn sign(signing_string: &str, private_key: &RsaPrivateKey) -> String {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    BASE64.encode(signature.to_bytes())
}

/// Verify an RSA-PKCS#1-v1.5 signature over a signing string.
pub fn verify(
    signing_string: &str,
    signature: &[u8],
    public_key: &RsaPublicKey,
) -> Result<(), AppError> {
    let verifier = VerifyingKey::<Sha256>::new(public_key.clone());
    let signature = Pkcs1v15Signature::try_from(signature)
        .map_err(|e| AppError::Unauthorized(format!("invalid signature format: {e}")))?;
    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|e| AppError::Unauthorized(format!("signature did not match digest: {e}")))
}

/// Parse a PKCS#8 PEM private key, tolerating `\n` escape sequences.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, AppError> {
    let pem = crate::config::unescape_pem(pem);
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .map_err(|e| AppError::Config(format!("failed to parse private key: {e}")))
}

/// Parse a PKIX (SubjectPublicKeyInfo) PEM public key.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, AppError> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| AppError::Unauthorized(format!("couldn't parse public key: {e}")))
}

/// Parsed parameters of a `Signature` header.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// URL of the signing key (`actor#fragment`)
    pub key_id: String,
    /// Space-separated header list the sender signed, verbatim
    pub headers: String,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
}

/// Parse `keyId="…",algorithm="…",headers="…",signature="…"`.
///
/// `rsa-sha256` and `hs2019` are both accepted and verified as
/// RSA-SHA256; in practice Fediverse senders labeling `hs2019` still
/// sign that way. The declared header list must be a subset of
/// `allowed`.
pub fn parse_signature_header(
    header: &str,
    allowed: &str,
) -> Result<ParsedSignature, AppError> {
    let allowed: Vec<&str> = allowed.split(' ').collect();

    let mut key_id = String::new();
    let mut sig_base64 = String::new();
    let mut sig_headers = None;

    for part in header.split(',') {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        if value.len() < 2 {
            continue;
        }
        // remove quotes
        let value = value.trim_matches('"');
        match name.trim() {
            "keyId" => key_id = value.to_string(),
            "signature" => sig_base64 = value.to_string(),
            "algorithm" => {
                let algo = value.to_lowercase();
                if algo != "rsa-sha256" && algo != "hs2019" {
                    return Err(AppError::BadRequest(
                        "unsupported signature algorithm".to_string(),
                    ));
                }
            }
            "headers" => {
                // headers are always lowercase in the signature
                for token in value.split(' ') {
                    if !allowed.contains(&token) {
                        return Err(AppError::BadRequest(
                            "bad signature headers".to_string(),
                        ));
                    }
                }
                sig_headers = Some(value.to_string());
            }
            _ => {}
        }
    }

    if key_id.is_empty() || sig_base64.is_empty() {
        return Err(AppError::BadRequest("invalid signature".to_string()));
    }
    let Some(headers) = sig_headers else {
        return Err(AppError::BadRequest("bad signature headers".to_string()));
    };

    let signature = BASE64
        .decode(sig_base64.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("couldn't decode base64 signature: {e}")))?;

    Ok(ParsedSignature {
        key_id,
        headers,
        signature,
    })
}

/// `Digest` header value for a body: `SHA-256=base64(sha256(body))`.
pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Check a `Digest` header against the raw body.
///
/// The algorithm label is case-insensitive; only SHA-256 is
/// supported. The inputs are not secret, so the comparison does not
/// have to be constant time.
pub fn verify_digest(header: &str, body: &[u8]) -> Result<(), AppError> {
    let Some((algo, digest_base64)) = header.split_once('=') else {
        return Err(AppError::BadRequest("malformed digest header".to_string()));
    };
    if algo.to_lowercase() != "sha-256" {
        return Err(AppError::BadRequest(
            "unsupported digest algorithm".to_string(),
        ));
    }
    let digest_bytes = BASE64
        .decode(digest_base64.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("couldn't decode base64 digest: {e}")))?;

    if Sha256::digest(body).as_slice() != digest_bytes.as_slice() {
        return Err(AppError::BadRequest(
            "digest didn't match message body".to_string(),
        ));
    }
    Ok(())
}

/// Compose and sign the headers for an outbound request.
///
/// Returns the headers to transmit: `Date`, `Digest`, `Signature`,
/// plus `Content-Type` on POST. The signed header list is
/// [`POST_SIGNED_HEADERS`] or [`GET_SIGNED_HEADERS`] by method; GETs
/// sign a digest over the empty body.
pub fn sign_request(
    method: &str,
    url: &Url,
    body: &[u8],
    private_key_pem: &str,
    key_id: &str,
) -> Result<HeaderMap, AppError> {
    let host = url
        .host_str()
        .map(|host| match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
        .ok_or_else(|| AppError::BadRequest(format!("missing host in URL {url}")))?;

    let date = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    let digest = digest_header(body);

    let mut headers = HeaderMap::new();
    headers.insert("date", header_value(&date)?);
    headers.insert("digest", header_value(&digest)?);

    let header_list = if method.eq_ignore_ascii_case("POST") {
        headers.insert(
            "content-type",
            header_value("application/activity+json; charset=utf-8")?,
        );
        POST_SIGNED_HEADERS
    } else {
        GET_SIGNED_HEADERS
    };

    let signing = signing_string(&host, method, url.path(), header_list, &headers);
    let private_key = private_key_from_pem(private_key_pem)?;
    let signature = sign(&signing, &private_key);

    let signature_header = format!(
        "keyId=\"{key_id}\",algorithm=\"rsa-sha256\",headers=\"{header_list}\",signature=\"{signature}\""
    );
    headers.insert("signature", header_value(&signature_header)?);

    Ok(headers)
}

fn header_value(value: &str) -> Result<http::HeaderValue, AppError> {
    http::HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    fn test_key() -> &'static RsaPrivateKey {
        use std::sync::OnceLock;
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::thread_rng();
            RsaPrivateKey::new(&mut rng, 2048).unwrap()
        })
    }

    #[test]
    fn signing_string_keeps_declared_order_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert("date", "Mon, 01 Jun 2026 10:00:00 GMT".parse().unwrap());
        headers.insert("digest", "SHA-256=abc".parse().unwrap());

        let signing = signing_string(
            "example.social",
            "POST",
            "/ap/inbox",
            POST_SIGNED_HEADERS,
            &headers,
        );

        assert_eq!(
            signing,
            "host: example.social\n\
             date: Mon, 01 Jun 2026 10:00:00 GMT\n\
             digest: SHA-256=abc\n\
             content-type: \n\
             (request-target): post /ap/inbox"
        );
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = test_key();
        let public = key.to_public_key();

        let signing = "host: a\ndate: b\n(request-target): post /ap/inbox";
        let signature = sign(signing, key);
        let raw = BASE64.decode(signature).unwrap();

        assert!(verify(signing, &raw, &public).is_ok());
        assert!(verify("host: tampered", &raw, &public).is_err());
    }

    #[test]
    fn pem_round_trip() {
        let key = test_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        assert!(private_key_from_pem(&pem).is_ok());

        // with escaped newlines, as deployment environments store it
        let escaped = pem.replace('\n', "\\n");
        assert!(private_key_from_pem(&escaped).is_ok());

        let public_pem = key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();
        assert!(public_key_from_pem(&public_pem).is_ok());
        assert!(public_key_from_pem("not a key").is_err());
    }

    #[test]
    fn parse_signature_header_extracts_parameters() {
        let parsed = parse_signature_header(
            "keyId=\"https://example.social/users/alice#main-key\",algorithm=\"rsa-sha256\",\
             headers=\"host date digest (request-target)\",signature=\"YWJj\"",
            POST_SIGNED_HEADERS,
        )
        .unwrap();

        assert_eq!(parsed.key_id, "https://example.social/users/alice#main-key");
        assert_eq!(parsed.headers, "host date digest (request-target)");
        assert_eq!(parsed.signature, b"abc");
    }

    #[test]
    fn parse_signature_header_accepts_hs2019() {
        let parsed = parse_signature_header(
            "keyId=\"k\",algorithm=\"hs2019\",headers=\"date\",signature=\"YWJj\"",
            POST_SIGNED_HEADERS,
        );
        assert!(parsed.is_ok());
    }

    #[test]
    fn parse_signature_header_rejects_bad_input() {
        // unsupported algorithm
        assert!(parse_signature_header(
            "keyId=\"k\",algorithm=\"rsa-sha512\",headers=\"date\",signature=\"YWJj\"",
            POST_SIGNED_HEADERS,
        )
        .is_err());

        // header outside the allow-list
        assert!(parse_signature_header(
            "keyId=\"k\",algorithm=\"rsa-sha256\",headers=\"date x-custom\",signature=\"YWJj\"",
            POST_SIGNED_HEADERS,
        )
        .is_err());

        // content-type is allowed for POST but not GET
        assert!(parse_signature_header(
            "keyId=\"k\",algorithm=\"rsa-sha256\",headers=\"date content-type\",signature=\"YWJj\"",
            GET_SIGNED_HEADERS,
        )
        .is_err());

        // missing keyId
        assert!(parse_signature_header(
            "algorithm=\"rsa-sha256\",headers=\"date\",signature=\"YWJj\"",
            POST_SIGNED_HEADERS,
        )
        .is_err());
    }

    #[test]
    fn digest_header_round_trips() {
        let body = br#"{"type":"Follow"}"#;
        let header = digest_header(body);
        assert!(header.starts_with("SHA-256="));
        assert!(verify_digest(&header, body).is_ok());

        // case-insensitive algorithm label
        let lowered = header.replacen("SHA-256", "sha-256", 1);
        assert!(verify_digest(&lowered, body).is_ok());

        // flipping one byte of the body must fail
        let mut tampered = body.to_vec();
        tampered[0] ^= 1;
        assert!(verify_digest(&header, &tampered).is_err());

        assert!(verify_digest("SHA-512=YWJj", body).is_err());
        assert!(verify_digest("no-separator", body).is_err());
    }

    #[test]
    fn sign_request_produces_verifiable_headers() {
        let key = test_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let url = Url::parse("https://remote.example/users/alice/inbox").unwrap();
        let body = br#"{"type":"Accept"}"#;

        let headers = sign_request("POST", &url, body, &pem, "https://site/ap/user/blog#main-key")
            .unwrap();

        assert!(headers.contains_key("date"));
        assert_eq!(
            headers.get("digest").unwrap().to_str().unwrap(),
            &digest_header(body)
        );
        assert_eq!(
            headers.get("content-type").unwrap().to_str().unwrap(),
            "application/activity+json; charset=utf-8"
        );

        // the receiver's view: parse the header, rebuild, verify
        let parsed = parse_signature_header(
            headers.get("signature").unwrap().to_str().unwrap(),
            POST_SIGNED_HEADERS,
        )
        .unwrap();
        assert_eq!(parsed.key_id, "https://site/ap/user/blog#main-key");

        let signing = signing_string(
            "remote.example",
            "POST",
            "/users/alice/inbox",
            &parsed.headers,
            &headers,
        );
        assert!(verify(&signing, &parsed.signature, &key.to_public_key()).is_ok());
    }

    #[test]
    fn get_requests_sign_the_empty_body_digest() {
        let key = test_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let url = Url::parse("https://remote.example/users/alice").unwrap();

        let headers =
            sign_request("GET", &url, b"", &pem, "https://site/ap/user/blog#main-key").unwrap();

        assert!(!headers.contains_key("content-type"));
        assert_eq!(
            headers.get("digest").unwrap().to_str().unwrap(),
            &digest_header(b"")
        );

        let parsed = parse_signature_header(
            headers.get("signature").unwrap().to_str().unwrap(),
            GET_SIGNED_HEADERS,
        )
        .unwrap();
        assert_eq!(parsed.headers, GET_SIGNED_HEADERS);
    }
}
