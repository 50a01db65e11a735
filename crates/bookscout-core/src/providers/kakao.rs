// Kakao provider - bridges the API client with the CatalogProvider trait
use async_trait::async_trait;
use bookscout_api::{BookSearchResponse, KakaoBook, KakaoClient, SearchParams, SortOrder};
use tracing::debug;

use crate::{
    models::{BookRecord, CatalogPage},
    search::CatalogProvider,
    Result,
};

/// Wrapper around KakaoClient that implements CatalogProvider
pub struct KakaoProvider {
    client: KakaoClient,
    sort: SortOrder,
}

impl KakaoProvider {
    pub fn new(client: KakaoClient) -> Self {
        Self {
            client,
            sort: SortOrder::default(),
        }
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

#[async_trait]
impl CatalogProvider for KakaoProvider {
    async fn search_page(&self, query: &str, page: u32, size: u32) -> Result<CatalogPage> {
        let params = SearchParams::new(query).page(page).size(size).sort(self.sort);
        let response = self.client.search_books(&params).await?;

        debug!(
            "Catalog returned {} documents for {:?} page {} (is_end={})",
            response.documents.len(),
            query,
            page,
            response.meta.is_end
        );

        Ok(response_to_page(response))
    }

    async fn find_book(&self, isbn: &str) -> Result<Option<BookRecord>> {
        Ok(self.client.find_by_isbn(isbn).await?.map(kakao_to_record))
    }
}

fn response_to_page(response: BookSearchResponse) -> CatalogPage {
    CatalogPage {
        documents: response.documents.into_iter().map(kakao_to_record).collect(),
        is_end: response.meta.is_end,
        pageable_count: response.meta.pageable_count,
        total_count: response.meta.total_count,
    }
}

/// Convert a Kakao API document to our internal BookRecord model
fn kakao_to_record(doc: KakaoBook) -> BookRecord {
    BookRecord {
        isbn: doc.isbn.trim().to_string(),
        title: doc.title,
        publisher: doc.publisher,
        description: doc.contents,
        thumbnail_url: doc.thumbnail,
        authors: doc.authors,
        translators: doc.translators,
        price: doc.price,
        sale_price: doc.sale_price,
        release_date: doc.datetime,
        status: doc.status,
        detail_url: doc.url,
    }
}
