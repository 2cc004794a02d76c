//! ActivityPub federation module
//!
//! Handles:
//! - Key pair generation
//! - HTTP Signatures (signing and verification)
//! - Actor resolution (WebFinger, actor documents, cache)
//! - Activity processing (inbox)
//! - Activity delivery (outbox)

mod activity;
mod actor;
mod delivery;
mod inbox;
mod keys;
mod resolver;
mod signature;
mod verifier;
mod webfinger;

pub use activity::{Activity, ActivityKind, ActivityObject, EmbeddedActivity};
pub use actor::{
    ACTIVITY_JSON, ACTIVITYSTREAMS_CONTEXT, Actor, LD_JSON, PUBLIC_COLLECTION, PublicKey,
    is_activity_json, local_actor_uri,
};
pub use delivery::{DeliveryResult, OutboxDispatcher, builder};
pub use inbox::{ActivityObserver, InboxOutcome, InboxProcessor, MetricsObserver};
pub use keys::{DEFAULT_KEY_BITS, KeyPair, KeyPairProvider, RsaKeyPairProvider};
pub use resolver::{ActorResolver, CacheStats, RemoteActorCache, RemoteHostPolicy, ResolveActor};
pub use signature::{
    SignatureHeader, SignatureSigner, SignedRequestHeaders, build_signing_string,
    generate_digest, http_date, parse_signature_header, sign_bytes, strip_fragment, verify_bytes,
};
pub use verifier::{InboundRequest, SignatureVerifier};
pub use webfinger::{Handle, WebFingerLink, WebFingerResponse, generate_webfinger_response};

#[cfg(test)]
pub use keys::MockKeyPairProvider;
#[cfg(test)]
pub use resolver::MockResolveActor;
