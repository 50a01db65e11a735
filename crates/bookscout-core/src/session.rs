// Paginated search session - one query, many pages
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bookscout_api::MAX_PAGE;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    models::{BookRecord, CatalogPage},
    search::CatalogProvider,
    Result,
};

/// What a session tells its consumer after each request settles
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A page was appended to the results
    ResultsUpdated {
        query: String,
        /// Page number that was just applied
        page: u32,
        /// Records appended by this page
        added: usize,
        /// Total accumulated records for the query
        total: usize,
        is_last_page: bool,
    },
    /// A page request failed; results are untouched and the page can be retried
    FetchFailed {
        query: String,
        page: u32,
        error: String,
        retryable: bool,
    },
}

/// Where the session sits in its Idle -> Fetching -> Idle/Exhausted cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Fetching,
    Exhausted,
}

/// Read-only copy of the session state, for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub query: String,
    /// Next page that will be requested
    pub page: u32,
    pub is_last_page: bool,
    pub is_fetching: bool,
    pub results: Vec<BookRecord>,
    pub total_count: u64,
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        if self.is_fetching {
            SessionPhase::Fetching
        } else if self.is_last_page {
            SessionPhase::Exhausted
        } else {
            SessionPhase::Idle
        }
    }
}

#[derive(Debug)]
struct SessionState {
    query: String,
    page: u32,
    is_last_page: bool,
    is_fetching: bool,
    results: Vec<BookRecord>,
    total_count: u64,
    /// Bumped on every query change; requests carry the value they were issued under
    generation: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            query: String::new(),
            page: 1,
            is_last_page: false,
            is_fetching: false,
            results: Vec::new(),
            total_count: 0,
            generation: 0,
        }
    }

    fn reset(&mut self, query: &str) {
        self.query = query.to_string();
        self.page = 1;
        self.is_last_page = false;
        self.is_fetching = false;
        self.results.clear();
        self.total_count = 0;
        self.generation += 1;
    }
}

/// Identifies one in-flight page request
#[derive(Debug, Clone)]
struct PageTicket {
    query: String,
    page: u32,
    generation: u64,
}

/// Drives page-by-page retrieval for one query at a time.
///
/// At most one request is in flight. Changing the query starts a fresh
/// session; a response that arrives for an older query is dropped.
/// Page requests run as tokio tasks, so this must be used inside a runtime.
pub struct SearchSession {
    provider: Arc<dyn CatalogProvider>,
    page_size: u32,
    state: Arc<Mutex<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SearchSession {
    /// Create a session and the single receiver for its events
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        page_size: u32,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            provider,
            page_size: page_size.max(1),
            state: Arc::new(Mutex::new(SessionState::new())),
            events,
        };
        (session, receiver)
    }

    /// Start or continue a search.
    ///
    /// A new query resets the session first. Returns the handle of the
    /// spawned request, or `None` when nothing was issued: empty query,
    /// a request already in flight, or no pages left.
    pub fn search(&self, query: &str) -> Option<JoinHandle<()>> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Ignoring empty search query");
            return None;
        }

        let ticket = {
            let mut state = lock(&self.state);

            if state.query != query {
                info!("New search: {:?}", query);
                state.reset(query);
            }

            if state.is_fetching {
                debug!("Page {} of {:?} already in flight", state.page, query);
                return None;
            }

            if state.is_last_page {
                debug!("No more pages for {:?}", query);
                return None;
            }

            state.is_fetching = true;
            PageTicket {
                query: state.query.clone(),
                page: state.page,
                generation: state.generation,
            }
        };

        Some(self.spawn_fetch(ticket))
    }

    /// Continue with the next page of the current query, if there is one
    pub fn load_next_page_if_needed(&self) -> Option<JoinHandle<()>> {
        let query = lock(&self.state).query.clone();
        if query.is_empty() {
            return None;
        }
        self.search(&query)
    }

    /// Re-issue the page that last failed
    pub fn retry(&self) -> Option<JoinHandle<()>> {
        self.load_next_page_if_needed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);
        SessionSnapshot {
            query: state.query.clone(),
            page: state.page,
            is_last_page: state.is_last_page,
            is_fetching: state.is_fetching,
            results: state.results.clone(),
            total_count: state.total_count,
        }
    }

    pub fn current_query(&self) -> String {
        lock(&self.state).query.clone()
    }

    pub fn result_count(&self) -> usize {
        lock(&self.state).results.len()
    }

    pub fn is_fetching(&self) -> bool {
        lock(&self.state).is_fetching
    }

    fn spawn_fetch(&self, ticket: PageTicket) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let page_size = self.page_size;

        tokio::spawn(async move {
            let result = provider
                .search_page(&ticket.query, ticket.page, page_size)
                .await;
            apply_response(&state, &events, ticket, result);
        })
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    // The state is plain data and stays consistent even if a holder panicked
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_response(
    state: &Mutex<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    ticket: PageTicket,
    result: Result<CatalogPage>,
) {
    let mut state = lock(state);

    if state.generation != ticket.generation {
        debug!(
            "Discarding stale page {} for {:?} (current query {:?})",
            ticket.page, ticket.query, state.query
        );
        return;
    }

    state.is_fetching = false;

    let event = match result {
        Ok(page) => {
            let added = page.documents.len();
            state.results.extend(page.documents);
            state.page += 1;
            // The catalog serves no pages past MAX_PAGE
            let is_last_page = page.is_end || ticket.page >= MAX_PAGE;
            state.is_last_page = is_last_page;
            state.total_count = page.total_count;

            debug!(
                "Applied page {} for {:?}: +{} ({} total, last={})",
                ticket.page,
                ticket.query,
                added,
                state.results.len(),
                is_last_page
            );

            SessionEvent::ResultsUpdated {
                query: ticket.query,
                page: ticket.page,
                added,
                total: state.results.len(),
                is_last_page,
            }
        }
        Err(e) => {
            warn!(
                "Fetching page {} for {:?} failed: {}",
                ticket.page, ticket.query, e
            );
            SessionEvent::FetchFailed {
                query: ticket.query,
                page: ticket.page,
                retryable: e.is_retryable(),
                error: e.to_string(),
            }
        }
    };

    // A dropped receiver just means nobody is listening any more
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MockCatalogProvider;
    use crate::Error;
    use async_trait::async_trait;
    use bookscout_api::CatalogError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn record(isbn: &str) -> BookRecord {
        BookRecord {
            isbn: isbn.to_string(),
            title: format!("Book {}", isbn),
            ..Default::default()
        }
    }

    fn page(prefix: &str, count: usize, is_end: bool) -> CatalogPage {
        CatalogPage {
            documents: (0..count).map(|i| record(&format!("{}-{}", prefix, i))).collect(),
            is_end,
            pageable_count: 0,
            total_count: 25,
        }
    }

    fn isbns(records: &[BookRecord]) -> Vec<String> {
        records.iter().map(|r| r.isbn.clone()).collect()
    }

    #[tokio::test]
    async fn test_paginates_until_last_page() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_search_page()
            .withf(|query, page, size| query == "algorithms" && *page == 1 && *size == 10)
            .times(1)
            .returning(|_, _, _| Ok(page("p1", 10, false)));
        provider
            .expect_search_page()
            .withf(|query, page, _| query == "algorithms" && *page == 2)
            .times(1)
            .returning(|_, _, _| Ok(page("p2", 4, true)));

        let (session, mut events) = SearchSession::new(Arc::new(provider), 10);

        session.search("algorithms").unwrap().await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::ResultsUpdated {
                query: "algorithms".into(),
                page: 1,
                added: 10,
                total: 10,
                is_last_page: false,
            })
        );

        session.load_next_page_if_needed().unwrap().await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ResultsUpdated { page: 2, total: 14, is_last_page: true, .. })
        ));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.results.len(), 14);
        assert_eq!(snapshot.results[0].isbn, "p1-0");
        assert_eq!(snapshot.results[10].isbn, "p2-0");
        assert!(!snapshot.is_fetching);
        assert!(snapshot.is_last_page);
        assert_eq!(snapshot.page, 3);
        assert_eq!(snapshot.phase(), SessionPhase::Exhausted);

        // Exhausted: no further request reaches the provider (times(1) above)
        assert!(session.load_next_page_if_needed().is_none());
        assert!(session.search("algorithms").is_none());
    }

    #[tokio::test]
    async fn test_stops_at_catalog_page_limit() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_search_page()
            .times(MAX_PAGE as usize)
            .returning(|_, page, _| Ok(self::page(&format!("p{}", page), 2, false)));

        let (session, _events) = SearchSession::new(Arc::new(provider), 2);

        session.search("endless").unwrap().await.unwrap();
        while let Some(handle) = session.load_next_page_if_needed() {
            handle.await.unwrap();
        }

        let snapshot = session.snapshot();
        assert!(snapshot.is_last_page);
        assert_eq!(snapshot.results.len(), 2 * MAX_PAGE as usize);

        let mut unique = isbns(&snapshot.results);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), snapshot.results.len());
    }

    #[tokio::test]
    async fn test_load_next_page_without_query_is_noop() {
        let provider = MockCatalogProvider::new();
        let (session, _events) = SearchSession::new(Arc::new(provider), 10);

        assert!(session.load_next_page_if_needed().is_none());
        assert!(session.search("   ").is_none());
        assert_eq!(session.snapshot().phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_failure_keeps_results_and_allows_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut provider = MockCatalogProvider::new();
        provider
            .expect_search_page()
            .times(3)
            .returning(move |_, page, _| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                match call {
                    0 => Ok(self::page("p1", 10, false)),
                    1 => Err(Error::Catalog(CatalogError::RequestFailed {
                        status: 503,
                        body: "busy".into(),
                    })),
                    _ => {
                        assert_eq!(page, 2);
                        Ok(self::page("p2", 3, true))
                    }
                }
            });

        let (session, mut events) = SearchSession::new(Arc::new(provider), 10);

        session.search("rust").unwrap().await.unwrap();
        events.recv().await.unwrap();

        session.load_next_page_if_needed().unwrap().await.unwrap();
        match events.recv().await {
            Some(SessionEvent::FetchFailed { page, retryable, .. }) => {
                assert_eq!(page, 2);
                assert!(retryable);
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }

        let snapshot = session.snapshot();
        assert_eq!(snapshot.results.len(), 10);
        assert_eq!(snapshot.page, 2);
        assert!(!snapshot.is_fetching);
        assert!(!snapshot.is_last_page);

        session.retry().unwrap().await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ResultsUpdated { page: 2, total: 13, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_new_query_resets_results() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_search_page()
            .returning(|query, _, _| Ok(page(query, 2, false)));

        let (session, _events) = SearchSession::new(Arc::new(provider), 10);

        session.search("first").unwrap().await.unwrap();
        session.load_next_page_if_needed().unwrap().await.unwrap();
        assert_eq!(session.result_count(), 4);

        session.search("second").unwrap().await.unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.query, "second");
        assert_eq!(snapshot.page, 2);
        assert_eq!(isbns(&snapshot.results), vec!["second-0", "second-1"]);
    }

    /// Provider whose responses are held until the test releases them
    struct GatedProvider {
        gates: HashMap<String, Semaphore>,
        requests: AtomicUsize,
    }

    impl GatedProvider {
        fn new(queries: &[&str]) -> Self {
            Self {
                gates: queries
                    .iter()
                    .map(|q| (q.to_string(), Semaphore::new(0)))
                    .collect(),
                requests: AtomicUsize::new(0),
            }
        }

        fn release(&self, query: &str) {
            self.gates[query].add_permits(1);
        }
    }

    #[async_trait]
    impl CatalogProvider for GatedProvider {
        async fn search_page(&self, query: &str, _page: u32, _size: u32) -> Result<CatalogPage> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.gates[query]
                .acquire()
                .await
                .expect("gate closed")
                .forget();
            Ok(page(query, 3, false))
        }

        async fn find_book(&self, _isbn: &str) -> Result<Option<BookRecord>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let provider = Arc::new(GatedProvider::new(&["algorithms", "rust"]));
        let (session, mut events) = SearchSession::new(provider.clone(), 10);

        let stale = session.search("algorithms").unwrap();
        assert!(session.is_fetching());

        let fresh = session.search("rust").unwrap();

        provider.release("rust");
        fresh.await.unwrap();
        provider.release("algorithms");
        stale.await.unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.query, "rust");
        assert_eq!(isbns(&snapshot.results), vec!["rust-0", "rust-1", "rust-2"]);
        assert_eq!(snapshot.page, 2);
        assert!(!snapshot.is_fetching);

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ResultsUpdated { ref query, .. }) if query == "rust"
        ));
        assert!(events.try_recv().is_err());
        assert_eq!(provider.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_response_does_not_clear_new_fetch_flag() {
        let provider = Arc::new(GatedProvider::new(&["old", "new"]));
        let (session, _events) = SearchSession::new(provider.clone(), 10);

        let stale = session.search("old").unwrap();
        let fresh = session.search("new").unwrap();

        provider.release("old");
        stale.await.unwrap();

        // "new" is still in flight, so a duplicate request must be refused
        assert!(session.is_fetching());
        assert!(session.load_next_page_if_needed().is_none());

        provider.release("new");
        fresh.await.unwrap();
        assert!(!session.is_fetching());
        assert_eq!(provider.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_search_while_fetching_is_ignored() {
        let provider = Arc::new(GatedProvider::new(&["rust"]));
        let (session, _events) = SearchSession::new(provider.clone(), 10);

        let first = session.search("rust").unwrap();
        assert!(session.search("rust").is_none());
        assert!(session.load_next_page_if_needed().is_none());

        provider.release("rust");
        first.await.unwrap();
        assert_eq!(provider.requests.load(Ordering::SeqCst), 1);
        assert_eq!(session.result_count(), 3);
    }

    #[tokio::test]
    async fn test_returning_to_previous_query_ignores_its_old_response() {
        let provider = Arc::new(GatedProvider::new(&["a", "b"]));
        let (session, _events) = SearchSession::new(provider.clone(), 10);

        let first_a = session.search("a").unwrap();
        let _b = session.search("b").unwrap();
        let second_a = session.search("a").unwrap();

        // Both "a" requests complete; only the current generation may land
        provider.release("a");
        provider.release("a");
        first_a.await.unwrap();
        second_a.await.unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.query, "a");
        assert_eq!(snapshot.results.len(), 3);
        assert_eq!(snapshot.page, 2);
    }
}
