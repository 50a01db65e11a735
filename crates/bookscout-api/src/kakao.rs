use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::{is_retryable_status, with_retry, RetryConfig, Retryable};

const KAKAO_API_BASE: &str = "https://dapi.kakao.com";

/// Largest page size and page number the search endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE: u32 = 50;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("API request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication failed, check the REST API key")]
    AuthRequired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl Retryable for CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            CatalogError::RequestFailed { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            CatalogError::RateLimitExceeded => true,
            CatalogError::NetworkError(e) => !e.is_builder(),
            CatalogError::InvalidRequest(_)
            | CatalogError::AuthRequired
            | CatalogError::ParseError(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Result ordering supported by the search endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Accuracy,
    Latest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Accuracy => "accuracy",
            SortOrder::Latest => "latest",
        }
    }
}

/// Restricts which document field the query is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTarget {
    Title,
    Isbn,
    Publisher,
    Person,
}

impl SearchTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchTarget::Title => "title",
            SearchTarget::Isbn => "isbn",
            SearchTarget::Publisher => "publisher",
            SearchTarget::Person => "person",
        }
    }
}

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub page: u32,
    pub size: u32,
    pub sort: Option<SortOrder>,
    pub target: Option<SearchTarget>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            size: 10,
            sort: None,
            target: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.clamp(1, MAX_PAGE);
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn target(mut self, target: SearchTarget) -> Self {
        self.target = Some(target);
        self
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("query", self.query.clone()),
            ("page", self.page.to_string()),
            ("size", self.size.to_string()),
        ];
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        if let Some(target) = self.target {
            pairs.push(("target", target.as_str().to_string()));
        }
        pairs
    }
}

/// Client for the Kakao book search API
pub struct KakaoClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl KakaoClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, KAKAO_API_BASE.to_string())
    }

    /// Point the client at another host, mostly useful for proxies and tests
    pub fn with_base_url(api_key: impl Into<String>, base_url: String) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("BookScout/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        })
    }

    /// Replace the default retry configuration
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_search_request(&self, params: &SearchParams) -> Result<reqwest::Request> {
        let url = format!("{}/v3/search/book", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&params.query_pairs())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("KakaoAK {}", self.api_key),
            )
            .build()?;
        Ok(request)
    }

    /// Fetch one page of search results
    pub async fn search_books(&self, params: &SearchParams) -> Result<BookSearchResponse> {
        if params.query.trim().is_empty() {
            return Err(CatalogError::InvalidRequest("query must not be empty".into()));
        }

        debug!(
            "Searching catalog: query={:?} page={} size={}",
            params.query, params.page, params.size
        );

        with_retry(&self.retry_config, || async {
            let request = self.build_search_request(params)?;
            let response = self.client.execute(request).await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(CatalogError::AuthRequired);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(CatalogError::RateLimitExceeded);
            }

            if status == reqwest::StatusCode::BAD_REQUEST {
                let body = response.text().await.unwrap_or_default();
                return Err(CatalogError::InvalidRequest(body));
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CatalogError::RequestFailed {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = response.text().await?;
            let parsed: BookSearchResponse = serde_json::from_str(&body)?;
            Ok(parsed)
        })
        .await
    }

    /// Look a single book up by ISBN (either the 10 or 13 digit form)
    pub async fn find_by_isbn(&self, isbn: &str) -> Result<Option<KakaoBook>> {
        let params = SearchParams::new(isbn)
            .target(SearchTarget::Isbn)
            .size(MAX_PAGE_SIZE);
        let response = self.search_books(&params).await?;

        Ok(response
            .documents
            .into_iter()
            .find(|doc| doc.isbn.split_whitespace().any(|token| token == isbn)))
    }
}

/// Top level response of the book search endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSearchResponse {
    #[serde(default, deserialize_with = "null_to_default")]
    pub documents: Vec<KakaoBook>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub meta: SearchMeta,
}

/// Paging metadata attached to every search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMeta {
    #[serde(default, deserialize_with = "null_to_default")]
    pub is_end: bool,
    #[serde(default, deserialize_with = "null_to_default")]
    pub pageable_count: u64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub total_count: u64,
}

/// One book document as returned by the API.
///
/// Every field tolerates being absent or `null`; a single broken field never
/// fails the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KakaoBook {
    #[serde(default, deserialize_with = "null_to_default")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub contents: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub datetime: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub isbn: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub price: i64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub publisher: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub sale_price: i64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub translators: Vec<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub url: String,
}

fn null_to_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
