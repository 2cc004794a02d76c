//! Inbound HTTP signature verification

use chrono::{DateTime, Utc};
use http::HeaderMap;

use super::actor::Actor;
use super::resolver::ResolveActor;
use super::signature::{
    REQUEST_TARGET, RSA_SHA256, SignatureHeader, build_signing_string, generate_digest, parse_signature_header,
    verify_bytes,
};
use crate::error::FederationError;

/// The parts of an inbound request covered by a signature
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Path plus query, exactly as received
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl InboundRequest {
    /// Header value as a string; repeated headers are joined with ", "
    fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }
}

/// Verifies inbox requests against the signer's published key
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    /// Maximum distance between a signed `Date` and now
    max_age: chrono::Duration,
}

impl SignatureVerifier {
    pub fn new(max_age_seconds: i64) -> Self {
        Self {
            max_age: chrono::Duration::seconds(max_age_seconds),
        }
    }

    /// Verify a signed request
    ///
    /// The signing string is rebuilt from the request's own header values, in
    /// the order listed by the signature. Checks that need no network run
    /// before the signer is resolved. If the signature does not match the
    /// cached key, the resolver is asked once for a fresh copy in case the key
    /// was rotated.
    ///
    /// # Returns
    /// The verified signing actor
    pub async fn verify(
        &self,
        request: &InboundRequest,
        resolver: &dyn ResolveActor,
    ) -> Result<Actor, FederationError> {
        let raw = request
            .headers
            .get("signature")
            .ok_or(FederationError::MissingSignature)?
            .to_str()
            .map_err(|_| FederationError::MalformedSignature("non-ASCII header".to_string()))?;

        let header = parse_signature_header(raw)?;
        if !header.algorithm.eq_ignore_ascii_case(RSA_SHA256) {
            return Err(FederationError::UnsupportedAlgorithm(header.algorithm));
        }

        check_covered_headers(request, &header)?;
        self.check_digest(request)?;
        self.check_date(request, &header)?;

        let signing_string = self.signing_string(request, &header)?;
        let actor_uri = header.actor_id().to_string();

        let actor = resolver
            .resolve_actor(&actor_uri)
            .await
            .map_err(into_resolution_error)?;

        match verify_with_actor(&actor, &header, &signing_string) {
            Err(FederationError::InvalidSignature | FederationError::NoPublicKey(_)) => {
                tracing::debug!(actor = %actor_uri, "Signature mismatch, refreshing actor key");
                let refreshed = resolver
                    .refresh_actor(&actor_uri)
                    .await
                    .map_err(into_resolution_error)?;

                if refreshed.public_key == actor.public_key {
                    return Err(FederationError::InvalidSignature);
                }
                verify_with_actor(&refreshed, &header, &signing_string)?;
                Ok(refreshed)
            }
            Err(other) => Err(other),
            Ok(()) => Ok(actor),
        }
    }

    fn signing_string(
        &self,
        request: &InboundRequest,
        header: &SignatureHeader,
    ) -> Result<String, FederationError> {
        let values: Vec<(String, Option<String>)> = header
            .headers
            .iter()
            .map(|name| (name.clone(), request.header(name)))
            .collect();
        let borrowed: Vec<(&str, Option<&str>)> = values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
            .collect();

        build_signing_string(&request.method, &request.path_and_query, &borrowed)
    }

    /// A `Digest` header, when present, must match the body
    fn check_digest(&self, request: &InboundRequest) -> Result<(), FederationError> {
        let Some(digest) = request.header("digest") else {
            return Ok(());
        };

        let expected = generate_digest(&request.body);
        let matches = digest.split(',').map(str::trim).any(|candidate| {
            match candidate.split_once('=') {
                Some((algorithm, _)) if algorithm.eq_ignore_ascii_case("sha-256") => {
                    candidate[algorithm.len()..] == expected["SHA-256".len()..]
                }
                _ => false,
            }
        });

        if matches {
            Ok(())
        } else {
            Err(FederationError::DigestMismatch)
        }
    }

    /// A signed `Date` must be within the accepted window
    fn check_date(
        &self,
        request: &InboundRequest,
        header: &SignatureHeader,
    ) -> Result<(), FederationError> {
        if !header.headers.iter().any(|h| h == "date") {
            return Ok(());
        }

        let date = request
            .header("date")
            .ok_or_else(|| FederationError::MissingHeader("date".to_string()))?;
        let date = DateTime::parse_from_rfc2822(&date)
            .map_err(|_| FederationError::StaleSignature)?
            .with_timezone(&Utc);

        if (Utc::now() - date).abs() > self.max_age {
            return Err(FederationError::StaleSignature);
        }
        Ok(())
    }
}

/// A POST must sign its target and its body digest
fn check_covered_headers(
    request: &InboundRequest,
    header: &SignatureHeader,
) -> Result<(), FederationError> {
    if !request.method.eq_ignore_ascii_case("POST") {
        return Ok(());
    }
    for required in [REQUEST_TARGET, "digest"] {
        if !header.headers.iter().any(|h| h == required) {
            return Err(FederationError::MissingHeader(required.to_string()));
        }
    }
    Ok(())
}

fn verify_with_actor(
    actor: &Actor,
    header: &SignatureHeader,
    signing_string: &str,
) -> Result<(), FederationError> {
    if header.key_id.contains('#') && header.key_id != actor.public_key.id {
        return Err(FederationError::NoPublicKey(format!(
            "{} does not advertise key {}",
            actor.id, header.key_id
        )));
    }
    verify_bytes(
        &actor.public_key.public_key_pem,
        signing_string.as_bytes(),
        &header.signature,
    )
}

/// Failures while resolving the signer surface as `ActorUnreachable`,
/// except a missing key which keeps its own kind.
fn into_resolution_error(err: FederationError) -> FederationError {
    match err {
        FederationError::ActorUnreachable(_) | FederationError::NoPublicKey(_) => err,
        other => FederationError::ActorUnreachable(other.to_string()),
    }
}
