//! Shared fakes and helpers for the engine flow tests.
//!
//! - `FakeRepository`: scripted observation streams with failure switches
//! - `ScriptedConnectivity`: raw online/offline sequence without de-duplication

#![allow(dead_code)]

use countries_core::{
    AppError, AppResult, ConnectivityObserver, CountriesRepository, Country, CountryId, ErrorKind,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn country(id: &str, name: &str) -> Country {
    Country {
        id: CountryId::new(id).unwrap(),
        name: name.into(),
        capital: None,
        currencies_display: String::new(),
        flag_url: Some(format!("https://flagcdn.com/w320/{}.png", id.to_lowercase())),
    }
}

pub fn sample_countries() -> Vec<Country> {
    vec![
        country("ARM", "Armenia"),
        country("ESP", "Spain"),
        country("FRA", "France"),
    ]
}

fn channel_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

type AllSender = mpsc::UnboundedSender<AppResult<Vec<Country>>>;
type OneSender = mpsc::UnboundedSender<AppResult<Option<Country>>>;

/// In-memory repository. `observe_all` replays the current snapshot to every
/// new subscriber and a successful refresh re-emits it, mirroring a store that
/// notifies on every write. `observe_one` emits only what the test pushes.
#[derive(Default)]
pub struct FakeRepository {
    snapshot: Mutex<Vec<Country>>,
    all_subscribers: Mutex<Vec<AllSender>>,
    one_subscribers: Mutex<Vec<(String, OneSender)>>,
    observe_all_calls: AtomicUsize,
    observe_one_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    fail_refresh: AtomicBool,
}

impl FakeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_countries(countries: Vec<Country>) -> Arc<Self> {
        let repo = Self::default();
        *repo.snapshot.lock().unwrap() = countries;
        Arc::new(repo)
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn observe_all_calls(&self) -> usize {
        self.observe_all_calls.load(Ordering::SeqCst)
    }

    pub fn observe_one_calls(&self) -> usize {
        self.observe_one_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Replaces the snapshot and pushes it to every live subscriber.
    pub fn emit_all(&self, countries: Vec<Country>) {
        *self.snapshot.lock().unwrap() = countries.clone();
        self.all_subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(Ok(countries.clone())).is_ok());
    }

    pub fn fail_all(&self, message: &str) {
        let error = AppError::new(ErrorKind::Storage, message);
        self.all_subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(Err(error.clone())).is_ok());
    }

    pub fn emit_one(&self, id: &str, country: Option<Country>) {
        self.one_subscribers
            .lock()
            .unwrap()
            .retain(|(key, tx)| key != id || tx.send(Ok(country.clone())).is_ok());
    }

    pub fn fail_one(&self, id: &str, message: &str) {
        let error = AppError::new(ErrorKind::Network, message);
        self.one_subscribers
            .lock()
            .unwrap()
            .retain(|(key, tx)| key != id || tx.send(Err(error.clone())).is_ok());
    }

    /// Subscribers whose receiving side is still alive.
    pub fn live_one_subscribers(&self) -> usize {
        self.one_subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }
}

#[async_trait::async_trait]
impl CountriesRepository for FakeRepository {
    fn observe_all(&self) -> BoxStream<'static, AppResult<Vec<Country>>> {
        self.observe_all_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(self.snapshot.lock().unwrap().clone()));
        self.all_subscribers.lock().unwrap().push(tx);
        channel_stream(rx)
    }

    fn observe_one(&self, id: &str) -> BoxStream<'static, AppResult<Option<Country>>> {
        self.observe_one_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.one_subscribers.lock().unwrap().push((id.to_string(), tx));
        channel_stream(rx)
    }

    async fn refresh(&self) -> AppResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AppError::from_http_status(503));
        }
        let countries = self.snapshot.lock().unwrap().clone();
        self.emit_all(countries);
        Ok(())
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Country>> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .snapshot
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

/// Connectivity source that forwards exactly what the test pushes, duplicates
/// included. Supports a single observer.
pub struct ScriptedConnectivity {
    tx: mpsc::UnboundedSender<bool>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<bool>>>,
}

impl ScriptedConnectivity {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn push(&self, online: bool) {
        let _ = self.tx.send(online);
    }
}

impl ConnectivityObserver for ScriptedConnectivity {
    fn observe(&self) -> BoxStream<'static, bool> {
        match self.rx.lock().unwrap().take() {
            Some(rx) => channel_stream(rx),
            None => stream::empty().boxed(),
        }
    }
}

/// Lets spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Advances paused time by `by`, then settles.
pub async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}
