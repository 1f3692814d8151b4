use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

use super::cursor::PageCursor;
use super::slot::{RequestSlot, SlotToken};
use super::QueryError;
use crate::api::{ApiError, ListSource, Page};

/// How a `run_query` or `refresh` should present itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// A silent run never raises `loading`; the view keeps showing the
    /// current items until the new page replaces them.
    pub silent: bool,
}

impl RunOptions {
    pub fn visible() -> Self {
        Self { silent: false }
    }

    pub fn silent() -> Self {
        Self { silent: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The response was current and is now reflected in the state.
    Applied,
    /// The request failed; an `ErrorNotice` was recorded.
    Failed,
    /// A newer request (or a reset) made this one stale. Nothing changed.
    Superseded,
    /// Nothing to do: no current params, no more pages, or a page load is
    /// already outstanding.
    Skipped,
}

/// A dismissible, user-facing failure message. One per failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub id: Uuid,
    pub message: String,
}

/// Everything a list view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<P, T> {
    pub params: Option<P>,
    pub cursor: PageCursor<T>,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<ErrorNotice>,
}

impl<P, T> QueryState<P, T> {
    fn empty(page_size: usize) -> Self {
        Self {
            params: None,
            cursor: PageCursor::new(page_size),
            loading: false,
            loading_more: false,
            error: None,
        }
    }

    pub fn items(&self) -> &[T] {
        self.cursor.items()
    }

    pub fn has_more(&self) -> bool {
        self.cursor.has_more()
    }
}

pub type StateOf<S> = QueryState<<S as ListSource>::Params, <S as ListSource>::Item>;

/// Incremental, cancellable list query.
///
/// Two request slots: `query` for first pages and `more` for the pages that
/// follow. A response is applied only while its slot token is current; the
/// currency check and the state update happen under the state lock, so a
/// response can never land after a newer request has been issued.
pub struct QueryController<S: ListSource> {
    source: S,
    page_size: usize,
    query_slot: RequestSlot,
    more_slot: RequestSlot,
    state: watch::Sender<StateOf<S>>,
}

impl<S: ListSource> QueryController<S> {
    pub fn new(source: S, page_size: usize) -> Result<Self, QueryError> {
        if page_size == 0 {
            return Err(QueryError::InvalidPageSize(page_size));
        }
        let (state, _) = watch::channel(QueryState::empty(page_size));
        Ok(Self {
            source,
            page_size,
            query_slot: RequestSlot::new("query"),
            more_slot: RequestSlot::new("more"),
            state,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> StateOf<S> {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StateOf<S>> {
        self.state.subscribe()
    }

    /// Fetch the first page for `params`.
    ///
    /// Params that differ from the current ones start a new query: the
    /// cursor is reset before anything is fetched. A newer `run_query` or a
    /// `reset` while this one is in flight abandons the fetch and returns
    /// `Superseded`.
    pub async fn run_query(&self, params: S::Params, options: RunOptions) -> QueryOutcome {
        let same_query = self.state.borrow().params.as_ref() == Some(&params);
        if !same_query {
            self.reset();
        }

        let mut token = self.query_slot.issue();
        self.more_slot.cancel();
        let generation = token.generation();

        self.state.send_if_modified(|state| {
            // A newer run already owns the state.
            if !token.is_current() {
                return false;
            }
            let mut changed = false;
            if state.params.as_ref() != Some(&params) {
                state.params = Some(params.clone());
                changed = true;
            }
            if state.loading_more {
                state.loading_more = false;
                changed = true;
            }
            if !options.silent && !state.loading {
                state.loading = true;
                changed = true;
            }
            changed
        });

        debug!(
            "query #{generation} started for {params:?} (silent: {})",
            options.silent
        );

        let Some(result) = self.fetch_unless_superseded(&mut token, &params, 0).await else {
            debug!("query #{generation} superseded before its response");
            return QueryOutcome::Superseded;
        };

        let mut outcome = QueryOutcome::Superseded;
        self.state.send_if_modified(|state| {
            if !token.is_current() {
                return false;
            }
            state.loading = false;
            outcome = match result {
                Ok(page) => {
                    // A fresh first page invalidates any next-page fetch
                    // that was computed against the old items.
                    self.more_slot.cancel();
                    state.loading_more = false;
                    state.cursor.replace(page);
                    QueryOutcome::Applied
                }
                Err(err) => {
                    state.error = Some(notice_for("query", &err));
                    QueryOutcome::Failed
                }
            };
            true
        });

        match outcome {
            QueryOutcome::Applied => debug!("query #{generation} applied"),
            QueryOutcome::Superseded => debug!("query #{generation} superseded"),
            _ => {}
        }
        outcome
    }

    /// Re-run the current params. `Skipped` when no query has run yet.
    pub async fn refresh(&self, options: RunOptions) -> QueryOutcome {
        let params = self.state.borrow().params.clone();
        match params {
            Some(params) => self.run_query(params, options).await,
            None => QueryOutcome::Skipped,
        }
    }

    /// Fetch the page after the loaded items and append it.
    pub async fn load_more(&self) -> QueryOutcome {
        let mut pending: Option<(S::Params, usize, SlotToken)> = None;
        self.state.send_if_modified(|state| {
            let Some(params) = state.params.clone() else {
                return false;
            };
            if state.loading_more || !state.cursor.has_more() {
                return false;
            }
            state.loading_more = true;
            pending = Some((params, state.cursor.offset(), self.more_slot.issue()));
            true
        });

        let Some((params, offset, mut token)) = pending else {
            return QueryOutcome::Skipped;
        };
        let generation = token.generation();
        debug!("load more #{generation} started at offset {offset}");

        let Some(result) = self.fetch_unless_superseded(&mut token, &params, offset).await else {
            debug!("load more #{generation} superseded before its response");
            return QueryOutcome::Superseded;
        };

        let mut outcome = QueryOutcome::Superseded;
        self.state.send_if_modified(|state| {
            if !token.is_current() {
                return false;
            }
            state.loading_more = false;
            outcome = match result {
                Ok(page) => {
                    let added = state.cursor.append(page);
                    debug!(
                        "load more #{generation} appended {added} items ({} of {})",
                        state.cursor.offset(),
                        state.cursor.total_count()
                    );
                    QueryOutcome::Applied
                }
                Err(err) => {
                    state.error = Some(notice_for("load more", &err));
                    QueryOutcome::Failed
                }
            };
            true
        });
        outcome
    }

    /// Forget the current query: cancel both slots and clear the state.
    pub fn reset(&self) {
        self.query_slot.cancel();
        self.more_slot.cancel();
        let page_size = self.page_size;
        self.state.send_modify(|state| *state = QueryState::empty(page_size));
    }

    pub fn dismiss_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    async fn fetch_unless_superseded(
        &self,
        token: &mut SlotToken,
        params: &S::Params,
        offset: usize,
    ) -> Option<Result<Page<S::Item>, ApiError>> {
        let fetch = self.source.fetch_page(params, offset, self.page_size);
        tokio::select! {
            biased;
            _ = token.superseded() => None,
            result = fetch => Some(result),
        }
    }
}

fn notice_for(kind: &str, err: &ApiError) -> ErrorNotice {
    error!("{kind} request failed: {err}");
    ErrorNotice {
        id: Uuid::new_v4(),
        message: err.to_string(),
    }
}
