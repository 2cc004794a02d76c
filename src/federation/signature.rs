//! HTTP Signatures for ActivityPub
//!
//! Signing string construction, `Signature` header parsing, and the outbound
//! signer. Nothing in here performs I/O.
//!
//! Wire format:
//! ```text
//! keyId="https://a.example/users/alice#main-key",algorithm="rsa-sha256",headers="(request-target) host date digest",signature="..."
//! ```

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::FederationError;

/// Pseudo-header covering method and path
pub const REQUEST_TARGET: &str = "(request-target)";

/// The only supported algorithm
pub const RSA_SHA256: &str = "rsa-sha256";

/// Headers covered by outbound signatures, in order
pub const DEFAULT_SIGNED_HEADERS: [&str; 4] = [REQUEST_TARGET, "host", "date", "digest"];

/// Parsed `Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// URL of the signing key (actor#main-key)
    pub key_id: String,
    pub algorithm: String,
    /// Covered header names, lowercased, in the order the sender listed them
    pub headers: Vec<String>,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
}

impl SignatureHeader {
    /// Actor URI of the signer (`keyId` without its fragment)
    pub fn actor_id(&self) -> &str {
        strip_fragment(&self.key_id)
    }

    /// Render back to the wire format
    pub fn to_header_value(&self) -> String {
        format!(
            "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            self.algorithm,
            self.headers.join(" "),
            BASE64.encode(&self.signature)
        )
    }
}

/// Strip a `#fragment` from a URI
pub fn strip_fragment(uri: &str) -> &str {
    uri.split('#').next().unwrap_or(uri)
}

/// Build the signing string
///
/// `headers` lists the covered headers in signing order. The value of
/// `(request-target)` is derived from `method` and `path`; every other entry
/// must carry a value.
///
/// # Errors
/// `MissingHeader` if a covered header has no value
pub fn build_signing_string(
    method: &str,
    path: &str,
    headers: &[(&str, Option<&str>)],
) -> Result<String, FederationError> {
    let mut lines = Vec::with_capacity(headers.len());

    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if name == REQUEST_TARGET {
            lines.push(format!(
                "{}: {} {}",
                REQUEST_TARGET,
                method.to_ascii_lowercase(),
                path
            ));
            continue;
        }

        let value = value.ok_or_else(|| FederationError::MissingHeader(name.clone()))?;
        lines.push(format!("{}: {}", name, value));
    }

    Ok(lines.join("\n"))
}

/// Parse `Signature` header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// Unknown parameters are ignored.
///
/// # Errors
/// `MalformedSignature` if a required parameter is missing or the signature
/// is not valid base64
pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, FederationError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"');

            match key.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect::<Vec<_>>(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }
    }

    let missing = |name: &str| FederationError::MalformedSignature(format!("missing {}", name));

    let key_id = key_id
        .filter(|k| !k.is_empty())
        .ok_or_else(|| missing("keyId"))?;
    let algorithm = algorithm.ok_or_else(|| missing("algorithm"))?;
    let headers = headers
        .filter(|h| !h.is_empty())
        .ok_or_else(|| missing("headers"))?;
    let signature = signature.ok_or_else(|| missing("signature"))?;
    let signature = BASE64
        .decode(signature.as_bytes())
        .map_err(|_| FederationError::MalformedSignature("signature is not base64".to_string()))?;

    Ok(SignatureHeader {
        key_id,
        algorithm,
        headers,
        signature,
    })
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("SHA-256={}", BASE64.encode(hasher.finalize()))
}

/// Format a timestamp as an HTTP date
pub fn http_date(time: chrono::DateTime<chrono::Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// RSA-SHA256 (PKCS#1 v1.5) signature over `data`
pub fn sign_bytes(private_key_pem: &str, data: &[u8]) -> Result<Vec<u8>, FederationError> {
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| FederationError::Key(format!("Invalid private key: {}", e)))?;

    let signing_key = SigningKey::<Sha256>::new(private_key);
    let mut rng = rand::thread_rng();
    Ok(signing_key.sign_with_rng(&mut rng, data).to_vec())
}

/// Verify an RSA-SHA256 (PKCS#1 v1.5) signature
///
/// # Errors
/// `NoPublicKey` if the PEM cannot be decoded, `InvalidSignature` on mismatch
pub fn verify_bytes(
    public_key_pem: &str,
    data: &[u8],
    signature: &[u8],
) -> Result<(), FederationError> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| FederationError::NoPublicKey(format!("undecodable key: {}", e)))?;

    let verifier = VerifyingKey::<Sha256>::new(public_key);
    let signature = Pkcs1v15Signature::try_from(signature)
        .map_err(|_| FederationError::InvalidSignature)?;

    verifier
        .verify(data, &signature)
        .map_err(|_| FederationError::InvalidSignature)
}

/// Headers to add to a signed outbound request
#[derive(Debug, Clone)]
pub struct SignedRequestHeaders {
    /// Host header value (with port when non-default)
    pub host: String,
    /// Date header value (HTTP-date)
    pub date: String,
    /// Digest header value
    pub digest: String,
    /// Signature header value
    pub signature: String,
}

/// Signs outbound requests with a local actor's private key
#[derive(Debug, Clone)]
pub struct SignatureSigner {
    covered: Vec<String>,
}

impl Default for SignatureSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureSigner {
    /// Signer covering `(request-target) host date digest`
    pub fn new() -> Self {
        Self {
            covered: DEFAULT_SIGNED_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Signer covering the given headers in the given order
    ///
    /// Only `(request-target)`, `host`, `date` and `digest` can be produced.
    pub fn with_covered_headers(headers: &[&str]) -> Self {
        Self {
            covered: headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    /// Sign a request
    ///
    /// # Arguments
    /// * `method` - HTTP method (e.g., "POST")
    /// * `url` - Full URL being requested
    /// * `body` - Request body (for digest)
    /// * `private_key_pem` - RSA private key in PEM format
    /// * `key_id` - Full URL to the public key (actor#main-key)
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        body: &[u8],
        private_key_pem: &str,
        key_id: &str,
    ) -> Result<SignedRequestHeaders, FederationError> {
        let parsed_url = url::Url::parse(url)
            .map_err(|e| FederationError::MalformedActivity(format!("Invalid URL {}: {}", url, e)))?;
        let host = host_header_value(&parsed_url).ok_or_else(|| {
            FederationError::MalformedActivity(format!("Missing host in URL {}", url))
        })?;

        let path_and_query = match parsed_url.query() {
            Some(query) => format!("{}?{}", parsed_url.path(), query),
            None => parsed_url.path().to_string(),
        };

        let date = http_date(chrono::Utc::now());
        let digest = generate_digest(body);

        let values: Vec<(&str, Option<&str>)> = self
            .covered
            .iter()
            .map(|name| {
                let value = match name.as_str() {
                    "host" => Some(host.as_str()),
                    "date" => Some(date.as_str()),
                    "digest" => Some(digest.as_str()),
                    _ => None,
                };
                (name.as_str(), value)
            })
            .collect();

        let signing_string = build_signing_string(method, &path_and_query, &values)?;
        let signature = sign_bytes(private_key_pem, signing_string.as_bytes())?;

        let header = SignatureHeader {
            key_id: key_id.to_string(),
            algorithm: RSA_SHA256.to_string(),
            headers: self.covered.clone(),
            signature,
        };

        Ok(SignedRequestHeaders {
            host,
            date,
            digest,
            signature: header.to_header_value(),
        })
    }
}

/// `Host` header value for a URL, as an HTTP client would send it
pub fn host_header_value(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
