//! URI canonicalization
//!
//! Every URI used as a document-store key goes through [`sluggify`]
//! first, so that two spellings of the same resource land on the same
//! document.

use url::Url;

use crate::error::AppError;

/// Characters folded into a dash when building a slug.
const FOLDED: &[char] = &['/', '@', '-', '.', ':', '#'];

/// Turn a URI into a store key.
///
/// Drops the fragment and the scheme, lowercases, then replaces each
/// maximal run of `/ @ - . : #` with a single `-` and trims leading
/// and trailing dashes. Deterministic and idempotent; URIs differing
/// only in case, scheme, or fragment produce the same slug.
pub fn sluggify(uri: &Url) -> String {
    let mut uri = uri.clone();
    uri.set_fragment(None);

    let raw = uri.as_str();
    let without_scheme = raw
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(raw)
        .to_lowercase();

    let mut slug = String::with_capacity(without_scheme.len());
    let mut last_dash = false;
    for c in without_scheme.chars() {
        if FOLDED.contains(&c) {
            if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        } else {
            slug.push(c);
            last_dash = false;
        }
    }

    slug.trim_matches('-').to_string()
}

/// Parse a URI string and sluggify it.
///
/// # Errors
/// `BadRequest` when the string is not an absolute URI.
pub fn sluggify_str(uri: &str) -> Result<String, AppError> {
    let parsed =
        Url::parse(uri).map_err(|e| AppError::BadRequest(format!("couldn't parse ID as URI: {e}")))?;
    Ok(sluggify(&parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(uri: &str) -> String {
        sluggify(&Url::parse(uri).unwrap())
    }

    #[test]
    fn folds_separator_runs_and_trims() {
        assert_eq!(
            slug("https://example.social/users/alice"),
            "example-social-users-alice"
        );
        assert_eq!(
            slug("https://site.example/posts/hello-world/"),
            "site-example-posts-hello-world"
        );
    }

    #[test]
    fn scheme_case_and_fragment_do_not_matter() {
        let base = slug("https://Example.Social/Users/Alice");
        assert_eq!(base, slug("http://example.social/users/alice"));
        assert_eq!(base, slug("https://example.social/users/alice#main-key"));
    }

    #[test]
    fn keeps_query_text() {
        assert_eq!(
            slug("https://example.social/item?page=2"),
            "example-social-item?page=2"
        );
    }

    #[test]
    fn sluggify_is_idempotent() {
        let inputs = [
            "https://example.social/users/alice",
            "https://site.example/posts/p1#frag",
            "https://a.example//double//slashes",
            "https://b.example/@handle@host",
        ];
        for input in inputs {
            let once = slug(input);
            // A slug has no scheme; re-parse it as a relative-style URI.
            let again = sluggify(&Url::parse(&format!("https://{once}")).unwrap());
            assert_eq!(once, again, "slug of {input} not stable");
        }
    }

    #[test]
    fn distinct_uris_stay_distinct() {
        assert_ne!(
            slug("https://example.social/users/alice"),
            slug("https://example.social/users/bob")
        );
        assert_ne!(
            slug("https://site.example/posts/p1"),
            slug("https://site.example/posts/p1/replies")
        );
    }

    #[test]
    fn rejects_relative_references() {
        assert!(sluggify_str("not a uri").is_err());
        assert!(sluggify_str("/relative/path").is_err());
    }
}
