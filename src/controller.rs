//! Incremental search and infinite-scroll pagination over a [`PagedFetcher`].
//!
//! The controller keeps two independent result sets: the most recent items
//! of the selected collection and the results of the current search. Which
//! one is shown depends on the current search query. Keystrokes are
//! debounced, superseded searches are cancelled, pages are merged by cursor
//! and failed fetches are retried with a linear backoff before an error is
//! surfaced.
//!
//! Background tasks never touch the state directly. They report through a
//! [`ControllerMsg`] channel and the owner feeds those messages back into
//! [`SearchController::update`], so every transition happens on one task
//! and is published as a single snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::cache::{SessionCache, Snapshot};
use crate::fetcher::{fetch_recent, fetch_search, PageRequest, PagedFetcher, DEFAULT_PAGE_SIZE};
use crate::types::{CollectionSelector, FetchEvent, Page};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_MIN_QUERY_CHARS: usize = 2;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub page_size: u32,
    pub debounce: Duration,
    pub min_query_chars: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub selector: CollectionSelector,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            debounce: DEFAULT_DEBOUNCE,
            min_query_chars: DEFAULT_MIN_QUERY_CHARS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            selector: CollectionSelector::default(),
        }
    }
}

/// Everything a renderer needs. Published as a whole after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState<T> {
    pub recent_items: Vec<T>,
    pub search_results: Vec<T>,
    pub is_loading_recent: bool,
    pub is_searching: bool,
    pub is_loading_more: bool,
    pub has_next_page_recent: bool,
    pub has_next_page_search: bool,
    pub current_search_query: String,
    pub error: Option<String>,
    pub show_retry_button: bool,
    pub retry_count: u32,
}

impl<T> Default for ControllerState<T> {
    fn default() -> Self {
        Self {
            recent_items: Vec::new(),
            search_results: Vec::new(),
            is_loading_recent: false,
            is_searching: false,
            is_loading_more: false,
            has_next_page_recent: true,
            has_next_page_search: true,
            current_search_query: String::new(),
            error: None,
            show_retry_button: false,
            retry_count: 0,
        }
    }
}

impl<T> ControllerState<T> {
    pub fn items(&self, track: Track) -> &[T] {
        match track {
            Track::Recent => &self.recent_items,
            Track::Search => &self.search_results,
        }
    }

    pub fn has_next_page(&self, track: Track) -> bool {
        match track {
            Track::Recent => self.has_next_page_recent,
            Track::Search => self.has_next_page_search,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Recent,
    Search,
}

/// Whether a fetch restarts pagination or continues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Reset,
    More,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    LoadingFresh,
    LoadingMore,
    BackingOff(FetchKind),
    AwaitingUserRetry(FetchKind),
}

impl Phase {
    fn loading(kind: FetchKind) -> Self {
        match kind {
            FetchKind::Reset => Phase::LoadingFresh,
            FetchKind::More => Phase::LoadingMore,
        }
    }

    /// A page can't be appended while another fetch for the track is
    /// pending, or before a failed fresh load has succeeded.
    fn blocks_load_more(self) -> bool {
        !matches!(
            self,
            Phase::Idle | Phase::AwaitingUserRetry(FetchKind::More)
        )
    }

    /// The track's items are about to be replaced, or should have been.
    fn reset_pending(self) -> bool {
        matches!(
            self,
            Phase::LoadingFresh
                | Phase::BackingOff(FetchKind::Reset)
                | Phase::AwaitingUserRetry(FetchKind::Reset)
        )
    }
}

/// Reports from the controller's background tasks.
#[derive(Debug)]
pub enum ControllerMsg<T> {
    QueryDebounced {
        epoch: u64,
        query: String,
    },
    Fetch {
        track: Track,
        generation: u64,
        kind: FetchKind,
        event: FetchEvent<T>,
    },
}

#[derive(Debug)]
struct TrackSlot {
    cursor: Option<String>,
    phase: Phase,
    /// Identifies the current operation; messages from older ones are dropped.
    generation: u64,
    token: CancellationToken,
    last_failed: Option<FetchKind>,
    /// Message shown while the track waits for a user retry.
    failure: Option<String>,
    /// Query of the current search operation. Unused by the recent track.
    query: String,
}

impl TrackSlot {
    fn new() -> Self {
        Self {
            cursor: None,
            phase: Phase::Idle,
            generation: 0,
            token: CancellationToken::new(),
            last_failed: None,
            failure: None,
            query: String::new(),
        }
    }

    /// Cancel whatever is in flight and advance the generation.
    fn supersede(&mut self) -> (u64, CancellationToken) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;
        self.failure = None;
        (self.generation, self.token.clone())
    }
}

pub struct SearchController<T: Clone + Send + Sync + 'static> {
    fetcher: Arc<dyn PagedFetcher<T>>,
    config: ControllerConfig,
    selector: CollectionSelector,
    /// Selector the current `recent_items` were fetched with.
    recent_selector: CollectionSelector,
    state: ControllerState<T>,
    state_tx: watch::Sender<ControllerState<T>>,
    msg_tx: mpsc::UnboundedSender<ControllerMsg<T>>,
    query_tx: watch::Sender<(u64, String)>,
    query_epoch: u64,
    last_triggered: Option<String>,
    recent: TrackSlot,
    search: TrackSlot,
    cache: SessionCache<T>,
    debouncer: CancellationToken,
    debounce_task: JoinHandle<()>,
}

impl<T: Clone + Send + Sync + 'static> SearchController<T> {
    /// Create a controller and start loading. Restores from `cache` when it
    /// holds a snapshot for the same collection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        fetcher: Arc<dyn PagedFetcher<T>>,
        config: ControllerConfig,
        cache: SessionCache<T>,
        msg_tx: mpsc::UnboundedSender<ControllerMsg<T>>,
    ) -> Self {
        let selector = config.selector;
        let restored = cache.restore().filter(|s| s.selector == selector);
        let initial_query = restored
            .as_ref()
            .map(|s| s.search_query.clone())
            .unwrap_or_default();

        let (state_tx, _) = watch::channel(ControllerState::default());
        let (query_tx, query_rx) = watch::channel((0, initial_query));
        let debouncer = CancellationToken::new();
        let debounce_task = tokio::spawn(debounce_queries(
            query_rx,
            config.debounce,
            msg_tx.clone(),
            debouncer.clone(),
        ));

        let mut controller = Self {
            fetcher,
            config,
            selector,
            recent_selector: selector,
            state: ControllerState::default(),
            state_tx,
            msg_tx,
            query_tx,
            query_epoch: 0,
            last_triggered: None,
            recent: TrackSlot::new(),
            search: TrackSlot::new(),
            cache,
            debouncer,
            debounce_task,
        };

        match restored {
            Some(snapshot) => controller.restore(snapshot),
            None => controller.spawn_fetch(Track::Recent, FetchKind::Reset, None),
        }
        controller.publish();
        controller
    }

    fn restore(&mut self, snapshot: Snapshot<T>) {
        debug!(
            items = snapshot.recent_items.len(),
            query = %snapshot.search_query,
            "restoring selector from session cache"
        );
        self.state.recent_items = snapshot.recent_items;
        self.state.has_next_page_recent = snapshot.has_next_page_recent;
        self.recent.cursor = snapshot.recent_cursor;

        // Saved searches are re-run rather than trusted.
        if !self.is_short(&snapshot.search_query) {
            self.last_triggered = Some(snapshot.search_query.clone());
            self.start_search(snapshot.search_query);
        }
    }

    pub fn state(&self) -> &ControllerState<T> {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerState<T>> {
        self.state_tx.subscribe()
    }

    pub fn selector(&self) -> CollectionSelector {
        self.selector
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    /// Track the UI should show, derived from the current search query.
    pub fn active_track(&self) -> Track {
        if self.is_short(&self.state.current_search_query) {
            Track::Recent
        } else {
            Track::Search
        }
    }

    fn is_short(&self, query: &str) -> bool {
        query.trim().chars().count() < self.config.min_query_chars
    }

    /// Record the latest query text. The search itself starts once the
    /// input has been quiet for the debounce window. Queries too short to
    /// search clear the search track right away.
    pub fn set_query(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.query_epoch += 1;
        self.query_tx.send_replace((self.query_epoch, text.clone()));

        if self.is_short(&text) {
            self.last_triggered = Some(text.clone());
            self.reset_search_track(text);
            self.publish();
        }
    }

    /// Fetch the next page of the active track.
    pub fn load_next_page(&mut self) {
        let track = self.active_track();
        if self.state.is_loading_more || self.slot(track).phase.blocks_load_more() {
            trace!(?track, "load more ignored: fetch pending");
            return;
        }
        if !self.state.has_next_page(track) {
            trace!(?track, "load more ignored: no further pages");
            return;
        }
        self.spawn_fetch(track, FetchKind::More, None);
        self.publish();
    }

    /// Switch collections. Both cursors are invalidated and the recent
    /// track reloads from scratch; an active search is re-run as well.
    pub fn set_collection_selector(&mut self, selector: CollectionSelector) {
        if selector == self.selector {
            return;
        }
        debug!(from = ?self.selector, to = ?selector, "collection changed");
        self.selector = selector;
        self.recent.cursor = None;
        self.search.cursor = None;
        self.state.retry_count = 0;
        self.spawn_fetch(Track::Recent, FetchKind::Reset, None);
        if self.active_track() == Track::Search {
            self.spawn_fetch(Track::Search, FetchKind::Reset, None);
        }
        self.publish();
    }

    /// Reload the active track from its first page.
    pub fn refresh(&mut self) {
        let track = self.active_track();
        if track == Track::Recent {
            self.cache.invalidate();
        }
        self.slot_mut(track).cursor = None;
        self.state.retry_count = 0;
        self.spawn_fetch(track, FetchKind::Reset, None);
        self.publish();
    }

    pub fn retry_recent(&mut self) {
        let kind = self.recent.last_failed.unwrap_or(FetchKind::Reset);
        self.restart_retry_ladder(Track::Recent, kind);
        self.publish();
    }

    pub fn retry_search(&mut self) {
        if self.active_track() != Track::Search {
            return;
        }
        let kind = self.search.last_failed.unwrap_or(FetchKind::Reset);
        self.restart_retry_ladder(Track::Search, kind);
        self.publish();
    }

    /// Retry whichever track is active.
    pub fn retry(&mut self) {
        match self.active_track() {
            Track::Recent => self.retry_recent(),
            Track::Search => self.retry_search(),
        }
    }

    /// Drop the search and fall back to recent items.
    pub fn clear_search(&mut self) {
        self.query_epoch += 1;
        self.query_tx.send_replace((self.query_epoch, String::new()));
        self.last_triggered = Some(String::new());
        self.reset_search_track(String::new());
        self.publish();
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
        self.state.show_retry_button = false;
        self.state.retry_count = 0;
        // A failed reset leaves no cursor to continue from, so that track
        // stays blocked until a retry or refresh succeeds.
        for slot in [&mut self.recent, &mut self.search] {
            slot.failure = None;
            if slot.phase == Phase::AwaitingUserRetry(FetchKind::More) {
                slot.phase = Phase::Idle;
            }
        }
        self.publish();
    }

    /// Apply a message from one of the controller's tasks.
    pub fn update(&mut self, msg: ControllerMsg<T>) {
        match msg {
            ControllerMsg::QueryDebounced { epoch, query } => {
                if epoch != self.query_epoch {
                    trace!(%query, "dropping superseded query");
                    return;
                }
                if self.last_triggered.as_deref() == Some(query.as_str()) {
                    return;
                }
                self.last_triggered = Some(query.clone());
                if self.is_short(&query) {
                    self.reset_search_track(query);
                } else {
                    self.state.retry_count = 0;
                    self.start_search(query);
                }
            }
            ControllerMsg::Fetch {
                track,
                generation,
                kind,
                event,
            } => {
                if generation != self.slot(track).generation {
                    trace!(?track, generation, "dropping result of superseded fetch");
                    return;
                }
                self.apply_fetch(track, kind, event);
            }
        }
        self.publish();
    }

    fn apply_fetch(&mut self, track: Track, kind: FetchKind, event: FetchEvent<T>) {
        match event {
            FetchEvent::Loading => {
                self.slot_mut(track).phase = Phase::loading(kind);
                self.state.error = None;
                self.state.show_retry_button = false;
            }
            FetchEvent::Success(page) => {
                self.merge_page(track, kind, page);
                let slot = self.slot_mut(track);
                slot.phase = Phase::Idle;
                slot.last_failed = None;
                self.state.error = None;
                self.state.show_retry_button = false;
                self.state.retry_count = 0;
            }
            FetchEvent::Error(message) => {
                let slot = self.slot_mut(track);
                slot.phase = Phase::Idle;
                slot.last_failed = Some(kind);
                self.schedule_retry(track, kind, message);
            }
        }
    }

    fn merge_page(&mut self, track: Track, kind: FetchKind, page: Page<T>) {
        let Page {
            items,
            has_next_page,
            end_cursor,
        } = page;
        let (list, has_next) = match track {
            Track::Recent => {
                if kind == FetchKind::Reset {
                    self.recent_selector = self.selector;
                }
                (
                    &mut self.state.recent_items,
                    &mut self.state.has_next_page_recent,
                )
            }
            Track::Search => (
                &mut self.state.search_results,
                &mut self.state.has_next_page_search,
            ),
        };
        match kind {
            FetchKind::Reset => *list = items,
            FetchKind::More => list.extend(items),
        }
        *has_next = has_next_page;
        self.slot_mut(track).cursor = end_cursor;
    }

    /// Climb one rung of the backoff ladder, or give up and ask the user.
    fn schedule_retry(&mut self, track: Track, kind: FetchKind, message: String) {
        if self.state.retry_count < self.config.max_retries {
            self.state.retry_count += 1;
            let delay = backoff_delay(self.config.backoff_base, self.state.retry_count);
            debug!(
                ?track,
                ?kind,
                attempt = self.state.retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "fetch failed, retrying"
            );
            self.spawn_fetch(track, kind, Some(delay));
        } else {
            warn!(?track, ?kind, error = %message, "fetch failed, retries exhausted");
            let slot = self.slot_mut(track);
            slot.phase = Phase::AwaitingUserRetry(kind);
            slot.failure = Some(message.clone());
            self.state.error = Some(message);
            self.state.show_retry_button = true;
        }
    }

    fn restart_retry_ladder(&mut self, track: Track, kind: FetchKind) {
        self.state.error = None;
        self.state.show_retry_button = false;
        self.state.retry_count = 0;
        if self.config.max_retries == 0 {
            self.spawn_fetch(track, kind, None);
            return;
        }
        self.state.retry_count = 1;
        self.spawn_fetch(track, kind, Some(self.config.backoff_base));
    }

    fn start_search(&mut self, query: String) {
        debug!(%query, "starting search");
        self.search.cursor = None;
        self.search.query = query.clone();
        self.state.current_search_query = query;
        self.spawn_fetch(Track::Search, FetchKind::Reset, None);
    }

    /// Cancel any search and empty its results, leaving `query` as the
    /// current (too short to search) query.
    fn reset_search_track(&mut self, query: String) {
        self.search.supersede();
        self.search.cursor = None;
        self.search.phase = Phase::Idle;
        self.search.last_failed = None;
        self.search.query.clear();
        self.state.search_results.clear();
        self.state.has_next_page_search = true;
        self.state.current_search_query = query;
        // Back on the recent track: show its unresolved failure, if any.
        self.state.error = self.recent.failure.clone();
        self.state.show_retry_button = self.state.error.is_some();
        self.state.retry_count = 0;
    }

    /// Start a fetch for `track`, superseding anything in flight there.
    /// With a delay the fetch waits out a backoff first.
    fn spawn_fetch(&mut self, track: Track, kind: FetchKind, delay: Option<Duration>) {
        let request = PageRequest {
            limit: self.config.page_size,
            cursor: match kind {
                FetchKind::Reset => None,
                FetchKind::More => self.slot(track).cursor.clone(),
            },
            selector: self.selector,
        };
        let slot = self.slot_mut(track);
        if kind == FetchKind::Reset {
            slot.cursor = None;
        }
        let (generation, token) = slot.supersede();
        slot.phase = match delay {
            Some(_) => Phase::BackingOff(kind),
            None => Phase::loading(kind),
        };
        let query = slot.query.clone();

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let mut events = match track {
                Track::Recent => fetch_recent(fetcher, request),
                Track::Search => fetch_search(fetcher, query, request),
            };
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => return,
                    next = events.next() => next,
                };
                let event = next.unwrap_or_else(|| {
                    FetchEvent::Error("fetch ended without a result".to_string())
                });
                let terminal = event.is_terminal();
                let msg = ControllerMsg::Fetch {
                    track,
                    generation,
                    kind,
                    event,
                };
                if tx.send(msg).is_err() || terminal {
                    return;
                }
            }
        });
    }

    fn slot(&self, track: Track) -> &TrackSlot {
        match track {
            Track::Recent => &self.recent,
            Track::Search => &self.search,
        }
    }

    fn slot_mut(&mut self, track: Track) -> &mut TrackSlot {
        match track {
            Track::Recent => &mut self.recent,
            Track::Search => &mut self.search,
        }
    }

    /// Derive the loading flags from the active track and publish.
    fn publish(&mut self) {
        let active = self.active_track();
        let phase = self.slot(active).phase;
        self.state.is_loading_recent = active == Track::Recent && phase == Phase::LoadingFresh;
        self.state.is_searching = active == Track::Search && phase == Phase::LoadingFresh;
        self.state.is_loading_more = phase == Phase::LoadingMore;
        self.state_tx.send_replace(self.state.clone());
    }

    fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            selector: self.recent_selector,
            recent_items: self.state.recent_items.clone(),
            recent_cursor: self.recent.cursor.clone(),
            has_next_page_recent: self.state.has_next_page_recent,
            search_query: self.state.current_search_query.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for SearchController<T> {
    fn drop(&mut self) {
        self.debouncer.cancel();
        self.debounce_task.abort();
        self.recent.token.cancel();
        self.search.token.cancel();
        // Mid-reset data is stale; leave the cache as it was.
        if !self.state.recent_items.is_empty() && !self.recent.phase.reset_pending() {
            self.cache.save(self.snapshot());
        }
    }
}

/// Wait before automatic retry number `attempt`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Trailing-edge debounce: emit the latest query once it has been stable
/// for `window`.
async fn debounce_queries<T>(
    mut rx: watch::Receiver<(u64, String)>,
    window: Duration,
    tx: mpsc::UnboundedSender<ControllerMsg<T>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = rx.changed() => if changed.is_err() { return },
        }

        // Every further keystroke restarts the window.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(window) => break,
                changed = rx.changed() => if changed.is_err() { return },
            }
        }

        let (epoch, query) = rx.borrow_and_update().clone();
        if tx.send(ControllerMsg::QueryDebounced { epoch, query }).is_err() {
            return;
        }
    }
}
