//! API layer
//!
//! HTTP handlers for:
//! - ActivityPub (inbox, followers)
//! - Per-post collections (replies, likes, shares)
//! - Internal shared-secret endpoints
//! - The static site surface

mod activitypub;
mod collections;
mod internal;
mod site;

pub use activitypub::{activitypub_router, ACTIVITY_JSON};
pub use collections::collections_router;
pub use internal::internal_router;
pub use site::site_router;
