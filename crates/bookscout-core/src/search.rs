use crate::models::{BookRecord, CatalogPage};
use crate::Result;

/// Anything that can answer paged book searches
///
/// The Kakao provider is the real one; tests plug in mocks. A session only
/// ever talks to the catalog through this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch page `page` (1-based) of `size` results for `query`
    async fn search_page(&self, query: &str, page: u32, size: u32) -> Result<CatalogPage>;

    /// Look up a single book by ISBN
    async fn find_book(&self, isbn: &str) -> Result<Option<BookRecord>>;
}
