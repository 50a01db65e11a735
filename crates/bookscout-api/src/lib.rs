// API client for the remote book catalog
pub mod kakao;
pub mod retry;

// Re-export common types
pub use kakao::{
    BookSearchResponse, CatalogError, KakaoBook, KakaoClient, SearchMeta, SearchParams,
    SearchTarget, SortOrder, MAX_PAGE, MAX_PAGE_SIZE,
};
pub use retry::{RetryConfig, Retryable};
