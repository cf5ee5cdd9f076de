//! Catalogue entities: books, categories and listing signatures.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Books returned per catalogue page.
pub const PAGE_SIZE: u32 = 35;

/// Book primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct BookId(i32);

impl BookId {
    /// Wrap a raw key.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw key.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Category primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryId(i32);

impl CategoryId {
    /// Wrap a raw key.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw key.
    pub const fn get(self) -> i32 {
        self.0
    }
}

/// Category reference attached to a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CategoryRef {
    pub id: CategoryId,
    #[schema(example = "Science")]
    pub name: String,
}

/// Catalogue view of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    #[schema(example = "Dune")]
    pub name: String,
    #[schema(example = "Frank Herbert")]
    pub author: String,
    pub publisher: String,
    pub description: String,
    pub available_stock: i32,
    pub categories: Vec<CategoryRef>,
}

/// A 1-based catalogue page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Page(u32);

impl Page {
    /// Accept pages starting at 1; anything lower is clamped to the first page.
    pub fn new(raw: u32) -> Self {
        Self(raw.max(1))
    }

    /// Page number.
    pub fn number(self) -> u32 {
        self.0
    }

    /// Row offset of the first entry on this page.
    pub fn offset(self) -> i64 {
        i64::from(self.0 - 1) * i64::from(PAGE_SIZE)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self(1)
    }
}

/// Which slice of the catalogue a caller wants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Listing {
    /// Every book.
    All,
    /// Books whose author contains the filter, case-insensitively.
    ByAuthor(String),
    /// Books in any of the named categories.
    ByCategories(BTreeSet<String>),
}

impl Listing {
    /// Build a category listing; names are trimmed, case-folded, de-duplicated
    /// and sorted.
    ///
    /// # Examples
    /// ```
    /// use lending::domain::Listing;
    ///
    /// let a = Listing::by_categories(["fiction", " Science", "FICTION"]);
    /// let b = Listing::by_categories(["Science", "fiction"]);
    /// assert_eq!(a, b);
    /// ```
    pub fn by_categories<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::ByCategories(
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }
}

/// Validated category creation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    #[schema(example = "Science")]
    pub name: String,
}

/// Book creation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    #[schema(example = "978-0441013593")]
    pub isbn: String,
    pub name: String,
    pub author: String,
    pub publisher: String,
    pub description: String,
    pub stock: i32,
    pub available_stock: i32,
    pub category_ids: Vec<CategoryId>,
}
