use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::state::StateHolder;
use super::task::TaskSlot;
use super::{EngineMetrics, MetricsSnapshot};
use crate::config::MissingCountryPolicy;
use crate::model::{Country, CountryDetail, DetailUiState, UiState};
use crate::repository::CountriesRepository;
use crate::{AppResult, CANT_LOAD_DETAILS_MESSAGE};

/// Drives the country detail screen for one country code at a time.
pub struct CountryDetailsEngine {
    inner: Arc<DetailInner>,
}

struct DetailInner {
    repository: Arc<dyn CountriesRepository>,
    policy: MissingCountryPolicy,
    state: StateHolder<DetailUiState>,
    observation: TaskSlot,
    metrics: EngineMetrics,
}

impl CountryDetailsEngine {
    pub fn new(repository: Arc<dyn CountriesRepository>, policy: MissingCountryPolicy) -> Self {
        Self {
            inner: Arc::new(DetailInner {
                repository,
                policy,
                state: StateHolder::new(DetailUiState::default()),
                observation: TaskSlot::new(),
                metrics: EngineMetrics::new(),
            }),
        }
    }

    pub fn state(&self) -> DetailUiState {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailUiState> {
        self.inner.state.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Observes the country with code `id`, replacing any earlier load. A blank
    /// id stops the earlier load and reports an error without subscribing.
    /// Must be called inside a tokio runtime.
    pub fn load(&self, id: &str) {
        let inner = &self.inner;
        if id.trim().is_empty() {
            inner.observation.cancel(&inner.state);
            inner.state.set_error(CANT_LOAD_DETAILS_MESSAGE);
            return;
        }

        let this = Arc::clone(inner);
        let id = id.to_string();
        inner.observation.restart(&inner.state, move |generation| {
            EngineMetrics::incr(&this.metrics.subscriptions);
            let country = this.repository.observe_one(&id);
            this.deliver(generation, |s| s.with_loading(true).with_error(None));
            tokio::spawn(this.run_observation(id, generation, country))
        });
    }
}

impl Drop for CountryDetailsEngine {
    fn drop(&mut self) {
        self.inner.observation.cancel(&self.inner.state);
    }
}

impl DetailInner {
    async fn run_observation(
        self: Arc<Self>,
        id: String,
        generation: u64,
        mut country: BoxStream<'static, AppResult<Option<Country>>>,
    ) {
        while let Some(next) = country.next().await {
            match next {
                Ok(Some(found)) => self.show(generation, &found),
                Ok(None) => self.show_missing(generation, &id),
                Err(err) => {
                    EngineMetrics::incr(&self.metrics.stream_errors);
                    warn!(%id, generation, error = %err, "country observation failed");
                    self.deliver(generation, |s| s.with_loading(false).with_error(Some(err.message)));
                    return;
                }
            }
        }
    }

    fn show(&self, generation: u64, country: &Country) {
        let detail = CountryDetail::from(country);
        self.deliver(generation, |_| DetailUiState {
            is_loading: false,
            error_message: None,
            detail,
        });
    }

    fn show_missing(&self, generation: u64, id: &str) {
        debug!(%id, policy = ?self.policy, "country not cached");
        match self.policy {
            MissingCountryPolicy::Placeholder => {
                self.deliver(generation, |_| DetailUiState::default());
            }
            MissingCountryPolicy::Error => {
                self.deliver(generation, |s| {
                    s.with_loading(false)
                        .with_error(Some(CANT_LOAD_DETAILS_MESSAGE.to_string()))
                });
            }
        }
    }

    fn deliver(&self, generation: u64, reducer: impl FnOnce(DetailUiState) -> DetailUiState) -> bool {
        self.state
            .update_if(|| self.observation.is_current(generation), reducer)
    }
}
