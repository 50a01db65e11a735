// SQLite-backed storage for bookmarks and recently viewed books

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{BookStore, RecentView, StoredRecord, DEFAULT_RECENT_CAPACITY};
