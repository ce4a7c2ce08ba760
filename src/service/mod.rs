//! Service layer
//!
//! The handlers that apply authenticated activities to the store.

pub mod endorsements;
pub mod follows;
pub mod inbox;
pub mod profile;
pub mod replies;

use url::Url;

/// Host of a URL with its explicit port, if any.
///
/// Matches the form [`crate::config::SiteConfig::host`] produces, so
/// on-host checks compare like with like.
pub(crate) fn authority(url: &Url) -> String {
    url.host_str()
        .map(|host| match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
        .unwrap_or_default()
}
