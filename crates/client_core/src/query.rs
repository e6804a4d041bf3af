use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::protocol::{
    CustomerListing, CustomerRecord, CustomerSummary, FilterKey, FilterSet, ListRequest,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    customer_client::CustomerApi,
    display_message,
    loaders::{require_data, LIST_FAILED_MESSAGE},
    UNEXPECTED_ERROR_MESSAGE,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
const PAGE_WINDOW: u32 = 5;

/// Pagination, search text and filters of one list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    pub page: u32,
    pub size: u32,
    pub search: String,
    pub filters: FilterSet,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            search: String::new(),
            filters: FilterSet::new(),
        }
    }
}

impl QueryState {
    pub fn request(&self) -> ListRequest {
        ListRequest {
            page: self.page,
            size: self.size,
            search: self.search.clone(),
            filters: self.filters.clone(),
        }
    }
}

/// What the list view renders. After a failure `customers` is empty and
/// `summary` is `None`; rows from an earlier fetch are never kept alongside
/// an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListView {
    pub customers: Vec<CustomerRecord>,
    pub summary: Option<CustomerSummary>,
    pub total_pages: u32,
    pub total_customers: u64,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl ListView {
    pub fn status_message(&self, page: u32, size: u32) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {error}");
        }
        if self.is_loading {
            return "Loading customers...".to_string();
        }
        if self.total_customers == 0 {
            return "No customers found".to_string();
        }
        let size = u64::from(size);
        let start = u64::from(page.saturating_sub(1)) * size + 1;
        let end = (u64::from(page) * size).min(self.total_customers);
        format!(
            "Showing {start}-{end} of {} customers",
            self.total_customers
        )
    }

    fn apply_listing(&mut self, listing: CustomerListing, requested_size: u32) {
        match listing {
            CustomerListing::Paginated(page) => {
                let size = if page.size > 0 { page.size } else { requested_size };
                self.total_pages = if page.pages > 0 || size == 0 {
                    page.pages
                } else {
                    page.total.div_ceil(u64::from(size)) as u32
                };
                self.total_customers = page.total;
                self.customers = page.items;
                self.summary = page.summary;
            }
            CustomerListing::Unpaginated { items, summary } => {
                self.total_pages = 1;
                self.total_customers = items.len() as u64;
                self.customers = items;
                self.summary = summary;
            }
        }
        self.error = None;
    }

    fn apply_error(&mut self, message: String) {
        self.customers.clear();
        self.summary = None;
        self.error = Some(message);
    }
}

/// Result of one fetch, from the point of view of the controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response belonged to the latest issued fetch and was applied.
    Applied,
    /// A newer fetch was issued meanwhile; the response was dropped.
    Superseded,
    /// The controller was detached; nothing was applied.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    Loading {
        seq: u64,
    },
    Loaded {
        seq: u64,
        total_customers: u64,
        total_pages: u32,
    },
    Failed {
        seq: u64,
        message: String,
    },
}

struct Inner {
    state: QueryState,
    view: ListView,
    latest_seq: u64,
}

/// Owns the query state of a customer list and keeps its view in sync.
///
/// Every state change issues a fresh fetch tagged with a sequence number.
/// Only the response to the most recently issued fetch updates the view, so
/// overlapping fetches may complete in any order.
pub struct QueryController<A: CustomerApi + ?Sized> {
    api: Arc<A>,
    inner: Mutex<Inner>,
    detached: AtomicBool,
    events: broadcast::Sender<QueryEvent>,
}

impl<A: CustomerApi + ?Sized> QueryController<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::with_state(api, QueryState::default())
    }

    pub fn with_state(api: Arc<A>, mut state: QueryState) -> Self {
        state.page = state.page.max(1);
        state.size = state.size.max(1);
        let (events, _) = broadcast::channel(256);
        Self {
            api,
            inner: Mutex::new(Inner {
                state,
                view: ListView::default(),
                latest_seq: 0,
            }),
            detached: AtomicBool::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> QueryState {
        self.inner.lock().await.state.clone()
    }

    pub async fn view(&self) -> ListView {
        self.inner.lock().await.view.clone()
    }

    pub async fn status_message(&self) -> String {
        let inner = self.inner.lock().await;
        inner
            .view
            .status_message(inner.state.page, inner.state.size)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Stops all further view updates, including those of fetches already
    /// in flight.
    pub fn detach(&self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            debug!("query controller detached");
        }
    }

    pub async fn set_search(&self, text: impl Into<String>) -> FetchOutcome {
        let text = text.into();
        self.update(move |state| {
            state.search = text;
            state.page = 1;
        })
        .await
    }

    pub async fn set_filters(&self, filters: FilterSet) -> FetchOutcome {
        self.update(move |state| {
            state.filters = filters;
            state.page = 1;
        })
        .await
    }

    /// Sets or, for a blank value, removes one filter key.
    pub async fn set_filter(&self, key: FilterKey, value: impl Into<String>) -> FetchOutcome {
        let value = value.into();
        self.update(move |state| {
            state.filters.set(key, value);
            state.page = 1;
        })
        .await
    }

    /// Does not clamp; see [`clamp_page`].
    pub async fn set_page(&self, page: u32) -> FetchOutcome {
        self.update(move |state| state.page = page).await
    }

    pub async fn set_page_size(&self, size: u32) -> FetchOutcome {
        self.update(move |state| {
            state.size = size.max(1);
            state.page = 1;
        })
        .await
    }

    pub async fn refetch(&self) -> FetchOutcome {
        self.update(|_| {}).await
    }

    async fn update(&self, change: impl FnOnce(&mut QueryState)) -> FetchOutcome {
        if self.is_detached() {
            return FetchOutcome::Detached;
        }

        let (seq, request) = {
            let mut inner = self.inner.lock().await;
            change(&mut inner.state);
            inner.latest_seq += 1;
            inner.view.is_loading = true;
            inner.view.error = None;
            (inner.latest_seq, inner.state.request())
        };
        let _ = self.events.send(QueryEvent::Loading { seq });
        debug!(
            seq,
            page = request.page,
            size = request.size,
            search = %request.search,
            filters = request.filters.len(),
            "fetching customers"
        );

        let result = self.api.list(&request).await;

        let mut inner = self.inner.lock().await;
        if self.is_detached() {
            debug!(seq, "dropping response after detach");
            return FetchOutcome::Detached;
        }
        if inner.latest_seq != seq {
            debug!(seq, latest = inner.latest_seq, "dropping superseded response");
            return FetchOutcome::Superseded;
        }

        inner.view.is_loading = false;
        let event = match result.and_then(|envelope| require_data(envelope, LIST_FAILED_MESSAGE)) {
            Ok(listing) => {
                inner.view.apply_listing(listing, request.size);
                info!(
                    seq,
                    total = inner.view.total_customers,
                    pages = inner.view.total_pages,
                    "customers loaded"
                );
                QueryEvent::Loaded {
                    seq,
                    total_customers: inner.view.total_customers,
                    total_pages: inner.view.total_pages,
                }
            }
            Err(err) => {
                let message = display_message(&err, UNEXPECTED_ERROR_MESSAGE);
                warn!(seq, kind = ?err.kind(), error = %message, "customer list fetch failed");
                inner.view.apply_error(message.clone());
                QueryEvent::Failed { seq, message }
            }
        };
        drop(inner);
        let _ = self.events.send(event);
        FetchOutcome::Applied
    }
}

/// Clamps a requested page into `1..=total_pages`.
pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

/// Page numbers to offer around `current`: at most five, kept inside
/// `1..=total_pages`.
pub fn page_window(current: u32, total_pages: u32) -> Vec<u32> {
    let count = total_pages.min(PAGE_WINDOW) as i64;
    let current = i64::from(current);
    let total = i64::from(total_pages);
    (0..count)
        .map(|i| {
            if current <= 3 {
                i + 1
            } else if current >= total - 2 {
                total - 4 + i
            } else {
                current - 2 + i
            }
        })
        .filter(|page| (1..=total).contains(page))
        .map(|page| page as u32)
        .collect()
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
