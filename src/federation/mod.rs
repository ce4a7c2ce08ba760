//! ActivityPub federation module
//!
//! Handles:
//! - HTTP Signatures (signing string, sign, verify)
//! - Inbound message authentication
//! - Actor resolution
//! - Signed outbound delivery
//! - Outbox broadcast to followers

mod actor;
mod auth;
mod broadcast;
mod delivery;
mod signature;

pub use actor::{fetch_actor, fetch_actor_by_uri};
pub use auth::authenticate;
pub use broadcast::{broadcast_outbox, BroadcastSummary};
pub use delivery::{accept_activity, is_bridge_inbox, Deliverer};
pub use signature::{
    digest_header, parse_signature_header, private_key_from_pem, public_key_from_pem, sign,
    sign_request, signing_string, verify, verify_digest, GET_SIGNED_HEADERS, POST_SIGNED_HEADERS,
};
