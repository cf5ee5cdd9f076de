//! Shared cache key type and the persisted key layout.
//!
//! The layout is the only index into cached data, so it must stay stable
//! across deployments.

use thiserror::Error;

use crate::domain::{BookId, Listing, LoanStatusFilter, Page, StudentId};

/// Namespace prefix for library entities.
pub const KEY_DOMAIN: &str = "library";

/// Validated key into the shared cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a raw key: non-empty and without surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, CacheKeyValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(CacheKeyValidationError::Empty);
        }
        if raw.trim() != raw {
            return Err(CacheKeyValidationError::ContainsWhitespace);
        }
        Ok(Self(raw))
    }

    // Every caller below starts from a fixed non-blank prefix and no
    // surrounding whitespace, so validation cannot fail.
    fn composed(raw: String) -> Self {
        Self(raw)
    }

    /// Ordered set of book ids for one listing page.
    ///
    /// # Examples
    /// ```
    /// use lending::domain::{Listing, Page};
    /// use lending::domain::ports::CacheKey;
    ///
    /// let key = CacheKey::listing(&Listing::ByAuthor("Le Guin".into()), Page::new(2));
    /// assert_eq!(key.as_str(), "library:books:author:le guin:page:2");
    /// ```
    pub fn listing(listing: &Listing, page: Page) -> Self {
        let n = page.number();
        match listing {
            Listing::All => Self::composed(format!("{KEY_DOMAIN}:books:all:page:{n}")),
            Listing::ByAuthor(author) => Self::composed(format!(
                "{KEY_DOMAIN}:books:author:{}:page:{n}",
                normalise_segment(author)
            )),
            Listing::ByCategories(names) => {
                let joined = names
                    .iter()
                    .map(|name| normalise_segment(name))
                    .collect::<Vec<_>>()
                    .join(",");
                Self::composed(format!("{KEY_DOMAIN}:books:category:{joined}:page:{n}"))
            }
        }
    }

    /// Per-book attribute hash.
    pub fn book(id: BookId) -> Self {
        Self::composed(format!("{KEY_DOMAIN}:book:id:{id}"))
    }

    /// Live refresh token for a student.
    pub fn refresh_token(student: StudentId) -> Self {
        Self::composed(format!("{KEY_DOMAIN}:accesstoken:id:{student}"))
    }

    /// Revoked access token marker.
    pub fn blacklist(token: &str) -> Self {
        Self::composed(format!("blacklist:accesstoken:{}", token.trim()))
    }

    /// Idempotency claim for a client-supplied key.
    pub fn idempotency(client_key: &str) -> Self {
        Self::composed(format!("idempotency:key:{}", client_key.trim()))
    }

    /// Sliding-window request log for a client address.
    pub fn rate_limit(client: &str) -> Self {
        Self::composed(format!("rate-limiter:ip:{}", client.trim()))
    }

    /// Cached loan report page.
    pub fn loan_report(filter: LoanStatusFilter, page: Page) -> Self {
        Self::composed(format!(
            "{KEY_DOMAIN}:loandata:{}:page:{}",
            filter.as_str(),
            page.number()
        ))
    }

    /// Borrow the underlying key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

// Author and category filters match case-insensitively, so their key
// segments are folded.
fn normalise_segment(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Validation errors returned when constructing [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheKeyValidationError {
    /// Key is empty after trimming whitespace.
    #[error("cache key must not be empty")]
    Empty,
    /// Key contains leading or trailing whitespace.
    #[error("cache key must not contain surrounding whitespace")]
    ContainsWhitespace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn new_rejects_blank(#[case] value: &str) {
        assert_eq!(CacheKey::new(value), Err(CacheKeyValidationError::Empty));
    }

    #[rstest]
    fn new_rejects_padding() {
        assert_eq!(
            CacheKey::new(" library:book:id:1"),
            Err(CacheKeyValidationError::ContainsWhitespace)
        );
    }

    #[rstest]
    #[case(CacheKey::listing(&Listing::All, Page::new(1)), "library:books:all:page:1")]
    #[case(
        CacheKey::listing(&Listing::by_categories(["Science", "fiction"]), Page::new(3)),
        "library:books:category:fiction,science:page:3"
    )]
    #[case(
        CacheKey::listing(&Listing::by_categories([" Poetry "]), Page::new(1)),
        "library:books:category:poetry:page:1"
    )]
    #[case(CacheKey::book(BookId::new(7)), "library:book:id:7")]
    #[case(CacheKey::refresh_token(StudentId::new(42)), "library:accesstoken:id:42")]
    #[case(CacheKey::blacklist("abc.def"), "blacklist:accesstoken:abc.def")]
    #[case(CacheKey::idempotency("k-1"), "idempotency:key:k-1")]
    #[case(CacheKey::rate_limit("10.0.0.1"), "rate-limiter:ip:10.0.0.1")]
    #[case(
        CacheKey::loan_report(LoanStatusFilter::Outstanding, Page::new(2)),
        "library:loandata:outstanding:page:2"
    )]
    fn layout_is_stable(#[case] key: CacheKey, #[case] expected: &str) {
        assert_eq!(key.as_str(), expected);
    }

    #[rstest]
    fn listing_keys_distinguish_pages_and_filters() {
        let a = CacheKey::listing(&Listing::ByAuthor("Ann".into()), Page::new(1));
        let b = CacheKey::listing(&Listing::ByAuthor("Ann".into()), Page::new(2));
        let c = CacheKey::listing(&Listing::ByAuthor("Bob".into()), Page::new(1));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[rstest]
    fn category_keys_ignore_case() {
        let page = Page::new(1);
        let upper = CacheKey::listing(&Listing::by_categories(["SCIENCE", "Fiction"]), page);
        let lower = CacheKey::listing(&Listing::by_categories(["fiction", "science"]), page);
        assert_eq!(upper, lower);
    }
}
