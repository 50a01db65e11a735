use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bookscout_api::{KakaoClient, RetryConfig};
use bookscout_core::{
    format_price, BookRecord, Config, Exporter, KakaoProvider, Library, SearchSession,
    SessionEvent,
};
use bookscout_store::BookStore;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bookscout")]
#[command(version, about = "Search the book catalog, keep bookmarks and recently viewed books", long_about = None)]
struct Cli {
    /// Kakao REST API key
    #[arg(long, env = "KAKAO_REST_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// SQLite file holding bookmarks and recently viewed books
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Results per page (1-50)
    #[arg(long, global = true)]
    page_size: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug, PartialEq)]
enum Commands {
    /// Search the catalog
    Search {
        query: String,
        /// How many pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a book's details and add it to recently viewed
    Open { isbn: String },
    /// Bookmark a book
    Bookmark { isbn: String },
    /// Remove a bookmark
    Unbookmark { isbn: String },
    /// List bookmarks
    Bookmarks {
        #[arg(long)]
        json: bool,
        /// Write bookmarks to a .json, .csv or .md file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List recently viewed books, most recent first
    Recent {
        #[arg(long)]
        json: bool,
        /// Forget all recently viewed books
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so --json output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookscout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = apply_overrides(Config::load()?, &cli);

    let db_path = config.database_path()?;
    let store = Arc::new(
        BookStore::open_with_capacity(&db_path, config.storage.recent_limit)
            .with_context(|| format!("Failed to open book store at {}", db_path.display()))?,
    );

    let api_key = config.catalog.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        tracing::debug!("No API key configured; catalog requests will be rejected");
    }
    let client = KakaoClient::with_base_url(api_key, config.catalog.base_url.clone())?
        .with_retry_config(RetryConfig::from(&config.retry));
    let provider = Arc::new(KakaoProvider::new(client).with_sort(config.catalog.sort));
    let library = Library::new(store, provider.clone());

    match cli.command {
        Commands::Search { query, pages, json } => {
            tracing::info!("Searching for: {}", query);
            let (session, events) = SearchSession::new(provider, config.catalog.page_size);
            let results = run_search(&session, events, &query, pages).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                let snapshot = session.snapshot();
                println!(
                    "{} of {} results for {:?}{}",
                    results.len(),
                    snapshot.total_count,
                    query,
                    if snapshot.is_last_page { "" } else { " (more available)" }
                );
                print_list(&results);
            }
        }
        Commands::Open { isbn } => {
            let book = library.find_book(&isbn).await?;
            // The detail view still renders if recording the visit fails
            if let Err(e) = library.open_detail(&book) {
                eprintln!("Could not update recently viewed: {}", e);
            }
            let bookmarked = library.is_bookmarked(&book.isbn).unwrap_or(false);
            print_detail(&book, bookmarked);
        }
        Commands::Bookmark { isbn } => {
            let book = library.find_book(&isbn).await?;
            library.bookmark(&book)?;
            println!("Saved {:?}", book.title);
        }
        Commands::Unbookmark { isbn } => {
            if library.remove_bookmark(&isbn)? {
                println!("Removed bookmark {}", isbn);
            } else {
                println!("{} was not bookmarked", isbn);
            }
        }
        Commands::Bookmarks { json, export } => {
            let books = library.bookmarks().unwrap_or_else(|e| {
                eprintln!("Could not read bookmarks: {}", e);
                Vec::new()
            });

            if let Some(path) = export {
                Exporter::export_to_file(&books, &path)?;
                println!("Exported {} bookmarks to {}", books.len(), path.display());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&books)?);
            } else if books.is_empty() {
                println!("No bookmarks yet");
            } else {
                print_list(&books);
            }
        }
        Commands::Recent { json, clear } => {
            if clear {
                let removed = library.store().clear_recent_views()?;
                println!("Cleared {} recently viewed books", removed);
                return Ok(());
            }

            let entries = library.recent_entries().unwrap_or_else(|e| {
                eprintln!("Could not read recently viewed books: {}", e);
                Vec::new()
            });

            if json {
                let books: Vec<&BookRecord> = entries.iter().map(|e| &e.record).collect();
                println!("{}", serde_json::to_string_pretty(&books)?);
            } else if entries.is_empty() {
                println!("Nothing viewed yet");
            } else {
                for (i, entry) in entries.iter().enumerate() {
                    println!(
                        "{:>3}. {} [{}] viewed {}",
                        i + 1,
                        entry.record.title,
                        entry.record.isbn,
                        entry.viewed_at.format("%Y-%m-%d %H:%M UTC")
                    );
                }
            }
        }
    }

    Ok(())
}

/// CLI flags and env win over the config file
fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(key) = &cli.api_key {
        config.catalog.api_key = Some(key.clone());
    }
    if let Some(db) = &cli.db {
        config.storage.db_path = Some(db.clone());
    }
    if let Some(size) = cli.page_size {
        config.catalog.page_size = size.clamp(1, bookscout_api::MAX_PAGE_SIZE);
    }
    config
}

/// Drive a session for up to `pages` pages, retrying a transient failure once
async fn run_search(
    session: &SearchSession,
    mut events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    query: &str,
    pages: u32,
) -> anyhow::Result<Vec<BookRecord>> {
    let mut loaded = 0;
    let mut retried = false;
    let mut pending = session.search(query);

    while let Some(handle) = pending.take() {
        handle.await?;

        match events.recv().await {
            Some(SessionEvent::ResultsUpdated { page, added, .. }) => {
                tracing::debug!("Page {} added {} results", page, added);
                loaded += 1;
                if loaded >= pages {
                    break;
                }
                pending = session.load_next_page_if_needed();
            }
            Some(SessionEvent::FetchFailed { error, retryable, .. }) => {
                if retryable && !retried {
                    retried = true;
                    eprintln!("Search failed ({}), retrying...", error);
                    pending = session.retry();
                } else if loaded == 0 {
                    anyhow::bail!("Search failed: {}", error);
                } else {
                    eprintln!("Stopped after {} pages: {}", loaded, error);
                }
            }
            None => break,
        }
    }

    Ok(session.snapshot().results)
}

fn print_list(books: &[BookRecord]) {
    for (i, book) in books.iter().enumerate() {
        println!(
            "{:>3}. {} - {} ({}) [{}]",
            i + 1,
            book.title,
            book.authors_display(),
            format_price(book.effective_price()),
            book.isbn
        );
    }
}

fn print_detail(book: &BookRecord, bookmarked: bool) {
    println!("{}{}", book.title, if bookmarked { "  [bookmarked]" } else { "" });
    println!("  Authors:    {}", book.authors_display());
    if !book.translators.is_empty() {
        println!("  Translators: {}", book.translators.join(", "));
    }
    println!("  Publisher:  {}", book.publisher);
    println!("  Price:      {}", format_price(book.price));
    if book.sale_price >= 0 && book.sale_price != book.price {
        println!("  Sale price: {}", format_price(book.sale_price));
    }
    if let Some(day) = book.release_day() {
        println!("  Released:   {}", day);
    }
    if !book.status.is_empty() {
        println!("  Status:     {}", book.status);
    }
    println!("  ISBN:       {}", book.isbn);
    if !book.detail_url.is_empty() {
        println!("  URL:        {}", book.detail_url);
    }
    if !book.description.is_empty() {
        println!();
        println!("{}", book.description);
    }
}
