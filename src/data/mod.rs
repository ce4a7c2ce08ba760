//! Data layer
//!
//! The document store and the models persisted in it.

mod models;
mod store;

pub use models::{Actor, ActorKey, Aggregate, LikeOrShare, Reply, ReplyCollection};
pub use store::{DocumentStore, StoreTx, FOLLOWERS, LIKES, REPLIES, SHARES};
