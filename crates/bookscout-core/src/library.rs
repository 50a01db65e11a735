// User intents: open, bookmark, unbookmark, plus lookups across store and catalog
use std::sync::Arc;

use bookscout_store::{BookStore, RecentView};
use tracing::{debug, info, warn};

use crate::{models::BookRecord, search::CatalogProvider, Error, Result};

/// Routes the user's book intents to the local store and the catalog
pub struct Library {
    store: Arc<BookStore>,
    provider: Arc<dyn CatalogProvider>,
}

impl Library {
    pub fn new(store: Arc<BookStore>, provider: Arc<dyn CatalogProvider>) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &Arc<BookStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn CatalogProvider> {
        &self.provider
    }

    /// The user opened a book's detail view
    pub fn open_detail(&self, record: &BookRecord) -> Result<()> {
        self.store.record_recent_view(record).map_err(|e| {
            warn!("Failed to record recent view of {}: {}", record.isbn, e);
            Error::from(e)
        })?;
        debug!("Recorded recent view of {}", record.isbn);
        Ok(())
    }

    pub fn bookmark(&self, record: &BookRecord) -> Result<()> {
        self.store.save_bookmark(record).map_err(|e| {
            warn!("Failed to bookmark {}: {}", record.isbn, e);
            Error::from(e)
        })?;
        info!("Bookmarked {:?}", record.title);
        Ok(())
    }

    /// Returns whether a bookmark was actually removed
    pub fn remove_bookmark(&self, isbn: &str) -> Result<bool> {
        let isbn = self.stored_key(isbn)?;
        let removed = self.store.delete_bookmark(&isbn).map_err(|e| {
            warn!("Failed to remove bookmark {}: {}", isbn, e);
            Error::from(e)
        })?;
        if removed {
            info!("Removed bookmark {}", isbn);
        }
        Ok(removed)
    }

    pub fn bookmarks(&self) -> Result<Vec<BookRecord>> {
        self.store.fetch_bookmarks().map_err(|e| {
            warn!("Failed to read bookmarks: {}", e);
            Error::from(e)
        })
    }

    pub fn recent_views(&self) -> Result<Vec<BookRecord>> {
        self.store.fetch_recent_views().map_err(|e| {
            warn!("Failed to read recently viewed books: {}", e);
            Error::from(e)
        })
    }

    pub fn recent_entries(&self) -> Result<Vec<RecentView<BookRecord>>> {
        Ok(self.store.fetch_recent_entries()?)
    }

    pub fn is_bookmarked(&self, isbn: &str) -> Result<bool> {
        let isbn = self.stored_key(isbn)?;
        Ok(self.store.is_bookmarked(&isbn)?)
    }

    /// Find a book by ISBN: bookmarks first, then recently viewed, then the catalog
    pub async fn find_book(&self, isbn: &str) -> Result<BookRecord> {
        let isbn = isbn.trim();
        if isbn.is_empty() {
            return Err(Error::NotFound("empty ISBN".into()));
        }

        match self.find_local(isbn) {
            Ok(Some(record)) => {
                debug!("Found {} locally", isbn);
                return Ok(record);
            }
            Ok(None) => debug!("{} not stored locally", isbn),
            Err(e) => warn!("Local lookup for {} failed: {}", isbn, e),
        }

        info!("Looking up {} in the catalog", isbn);
        self.provider
            .find_book(isbn)
            .await?
            .ok_or_else(|| Error::NotFound(isbn.to_string()))
    }

    fn find_local(&self, isbn: &str) -> Result<Option<BookRecord>> {
        if let Some(record) = self.store.get_bookmark::<BookRecord>(isbn)? {
            return Ok(Some(record));
        }
        if let Some(entry) = self.store.get_recent_view::<BookRecord>(isbn)? {
            return Ok(Some(entry.record));
        }

        // Stored keys hold both ISBN forms; fall back to matching either one
        let bookmarks: Vec<BookRecord> = self.store.fetch_bookmarks()?;
        if let Some(record) = bookmarks.into_iter().find(|r| r.matches_isbn(isbn)) {
            return Ok(Some(record));
        }
        let recent: Vec<BookRecord> = self.store.fetch_recent_views()?;
        Ok(recent.into_iter().find(|r| r.matches_isbn(isbn)))
    }

    /// Map either ISBN form onto the key a bookmark was saved under
    fn stored_key(&self, isbn: &str) -> Result<String> {
        let isbn = isbn.trim();
        if self.store.is_bookmarked(isbn)? {
            return Ok(isbn.to_string());
        }

        let bookmarks: Vec<BookRecord> = self.store.fetch_bookmarks()?;
        Ok(bookmarks
            .into_iter()
            .find(|r| r.matches_isbn(isbn))
            .map(|r| r.isbn.trim().to_string())
            .unwrap_or_else(|| isbn.to_string()))
    }
}
