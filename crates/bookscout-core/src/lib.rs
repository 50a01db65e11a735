// Core logic: book model, search sessions, bookmarks and recents
pub mod config;
pub mod error;
pub mod export;
pub mod library;
pub mod models;
pub mod providers;
pub mod search;
pub mod session;

pub use config::Config;
pub use error::Error;
pub use export::{format_price, ExportFormat, Exporter};
pub use library::Library;
pub use models::{BookRecord, CatalogPage};
pub use providers::KakaoProvider;
pub use search::CatalogProvider;
pub use session::{SearchSession, SessionEvent, SessionPhase, SessionSnapshot};

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
