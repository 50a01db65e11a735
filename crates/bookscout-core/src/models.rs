use bookscout_store::StoredRecord;
use serde::{Deserialize, Serialize};

/// One catalog entry. Built once from an API document and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Identity key. The catalog sends "ISBN10 ISBN13" (either may be missing)
    pub isbn: String,
    pub title: String,
    pub publisher: String,
    pub description: String,
    pub thumbnail_url: String,
    pub authors: Vec<String>,
    pub translators: Vec<String>,
    /// List price in whole currency units
    pub price: i64,
    /// Discounted price, negative when the book is not on sale
    pub sale_price: i64,
    /// ISO-8601 timestamp or empty
    pub release_date: String,
    pub status: String,
    pub detail_url: String,
}

impl BookRecord {
    pub fn isbn10(&self) -> Option<&str> {
        self.isbn.split_whitespace().find(|token| token.len() == 10)
    }

    pub fn isbn13(&self) -> Option<&str> {
        self.isbn.split_whitespace().find(|token| token.len() == 13)
    }

    /// Whether `isbn` names this book, in either form or as the full key
    pub fn matches_isbn(&self, isbn: &str) -> bool {
        let isbn = isbn.trim();
        !isbn.is_empty()
            && (self.isbn.trim() == isbn || self.isbn.split_whitespace().any(|t| t == isbn))
    }

    /// What the book actually sells for right now
    pub fn effective_price(&self) -> i64 {
        if self.sale_price >= 0 {
            self.sale_price
        } else {
            self.price
        }
    }

    pub fn authors_display(&self) -> String {
        self.authors.join(", ")
    }

    /// Release date without the time part, e.g. "2014-09-01"
    pub fn release_day(&self) -> Option<&str> {
        if self.release_date.is_empty() {
            return None;
        }
        Some(self.release_date.split('T').next().unwrap_or(&self.release_date))
    }
}

impl StoredRecord for BookRecord {
    fn isbn(&self) -> &str {
        &self.isbn
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// One page of search results as handed to a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPage {
    pub documents: Vec<BookRecord>,
    pub is_end: bool,
    pub pageable_count: u64,
    pub total_count: u64,
}
