use futures_util::stream::{BoxStream, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::debounce::Debouncer;
use super::state::StateHolder;
use super::task::TaskSlot;
use super::{EngineMetrics, MetricsSnapshot};
use crate::capabilities::ConnectivityObserver;
use crate::model::{ConnectivityStatus, Country, ListItem, ListUiState, UiState};
use crate::repository::CountriesRepository;
use crate::AppResult;

/// Items whose name contains the trimmed query, case-insensitively. A blank
/// query matches everything. Input order is kept.
pub fn filter_items(items: &[ListItem], query: &str) -> Vec<ListItem> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| item.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Drives the countries list screen.
///
/// Combines the cached countries with the debounced search query, refreshes
/// the cache on start and whenever connectivity comes back, and exposes the
/// result as a [`ListUiState`].
pub struct CountriesListEngine {
    inner: Arc<ListInner>,
}

struct ListInner {
    repository: Arc<dyn CountriesRepository>,
    connectivity: Arc<dyn ConnectivityObserver>,
    state: StateHolder<ListUiState>,
    query: Debouncer<String>,
    observation: TaskSlot,
    background: Mutex<Vec<JoinHandle<()>>>,
    metrics: EngineMetrics,
}

impl CountriesListEngine {
    /// Starts observing the cache, triggers a refresh and starts watching
    /// connectivity. Must be called inside a tokio runtime.
    pub fn new(
        repository: Arc<dyn CountriesRepository>,
        connectivity: Arc<dyn ConnectivityObserver>,
        query_debounce: Duration,
    ) -> Self {
        let inner = Arc::new(ListInner {
            repository,
            connectivity,
            state: StateHolder::new(ListUiState::initial()),
            query: Debouncer::spawn(String::new(), query_debounce),
            observation: TaskSlot::new(),
            background: Mutex::new(Vec::new()),
            metrics: EngineMetrics::new(),
        });

        inner.observe_data();
        inner.refresh();
        inner.observe_connectivity();

        Self { inner }
    }

    pub fn state(&self) -> ListUiState {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListUiState> {
        self.inner.state.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Records `text` verbatim right away; filtering follows once typing
    /// pauses.
    pub fn on_query_changed(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.state.update(|s| ListUiState {
            query: text.clone(),
            ..s
        });
        self.inner.query.push(text);
    }

    /// Starts the cache observation unless one is already running.
    pub fn observe_data(&self) {
        self.inner.observe_data();
    }

    /// Drops the current observation and starts a fresh one.
    pub fn retry(&self) {
        self.inner.observation.cancel(&self.inner.state);
        self.inner.observe_data();
    }

    pub fn refresh(&self) {
        self.inner.refresh();
    }
}

impl Drop for CountriesListEngine {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl ListInner {
    fn observe_data(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let started = self.observation.start_if_idle(&self.state, move |generation| {
            // Subscribe before spawning: a task aborted before its first poll
            // must still count as one subscription.
            EngineMetrics::incr(&this.metrics.subscriptions);
            let countries = this.repository.observe_all();
            let query = this.query.subscribe();
            this.deliver(generation, |s| s.with_loading(true).with_error(None));
            tokio::spawn(this.run_observation(generation, countries, query))
        });
        if started.is_none() {
            debug!("observation already running");
        }
    }

    async fn run_observation(
        self: Arc<Self>,
        generation: u64,
        mut countries: BoxStream<'static, AppResult<Vec<Country>>>,
        mut query: watch::Receiver<String>,
    ) {
        let mut items: Option<Vec<ListItem>> = None;

        loop {
            tokio::select! {
                next = countries.next() => match next {
                    Some(Ok(snapshot)) => {
                        items = Some(snapshot.iter().map(ListItem::from).collect());
                    }
                    Some(Err(err)) => {
                        EngineMetrics::incr(&self.metrics.stream_errors);
                        warn!(generation, error = %err, "countries observation failed");
                        self.deliver(generation, |s| s.with_loading(false).with_error(Some(err.message)));
                        return;
                    }
                    None => return,
                },
                changed = query.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            // Nothing to combine with until the first snapshot arrives.
            let Some(all) = items.as_deref() else {
                continue;
            };
            let current_query = query.borrow_and_update().clone();
            let filtered = filter_items(all, &current_query);
            EngineMetrics::incr(&self.metrics.filter_passes);
            self.deliver(generation, move |s| ListUiState {
                is_loading: false,
                error_message: None,
                items: filtered,
                ..s
            });
        }
    }

    fn deliver(&self, generation: u64, reducer: impl FnOnce(ListUiState) -> ListUiState) -> bool {
        self.state
            .update_if(|| self.observation.is_current(generation), reducer)
    }

    fn refresh(self: &Arc<Self>) {
        self.state.set_loading();
        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.run_refresh().await }));
    }

    #[instrument(skip(self))]
    async fn run_refresh(&self) {
        EngineMetrics::incr(&self.metrics.refreshes);
        match self.repository.refresh().await {
            Ok(()) => {
                info!("refresh completed");
                // A live observation clears the flag with the next snapshot.
                if !self.observation.is_active() {
                    self.state.update(|s| s.with_loading(false));
                }
            }
            Err(err) => {
                EngineMetrics::incr(&self.metrics.refresh_failures);
                warn!(error = %err, "refresh failed");
                self.state.set_error(err.message);
            }
        }
    }

    fn observe_connectivity(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.run_connectivity().await }));
    }

    async fn run_connectivity(self: Arc<Self>) {
        let mut signal = self.connectivity.observe();
        let mut was_online: Option<bool> = None;

        while let Some(online) = signal.next().await {
            match (online, was_online) {
                (true, Some(false)) => {
                    info!("connectivity restored");
                    self.set_connectivity(ConnectivityStatus::Online);
                    self.refresh();
                }
                (false, _) => {
                    debug!("connectivity lost");
                    self.set_connectivity(ConnectivityStatus::Offline);
                }
                _ => {}
            }
            was_online = Some(online);
        }
    }

    fn set_connectivity(&self, status: ConnectivityStatus) {
        self.state.update(|s| ListUiState {
            connectivity_status: status,
            ..s
        });
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn shutdown(&self) {
        self.observation.cancel(&self.state);
        let mut tasks = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
