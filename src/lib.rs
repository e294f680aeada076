// lib.rs - countries core: local cache, remote sync and view-state engines

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
pub mod capabilities;
pub mod config;
pub mod model;
pub mod repository;
pub mod store;
pub mod view_state;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub use app::CountriesCore;
pub use capabilities::{
    Capabilities, CapabilityError, ConnectivityObserver, CountriesApi, HttpError,
    RestCountriesClient, ShellConnectivity,
};
pub use config::{ConfigError, CoreConfig, MissingCountryPolicy};
pub use model::{
    ConnectivityStatus, Country, CountryDetail, CountryId, CountryRecord, DetailUiState,
    ListItem, ListUiState,
};
pub use repository::{CountriesRepository, CountryRepository};
pub use store::{CountryStore, StoreError};
#[cfg(not(target_arch = "wasm32"))]
pub use store::SqliteCountryStore;
pub use view_state::{CountriesListEngine, CountryDetailsEngine, EngineMetrics, MetricsSnapshot};

pub const QUERY_DEBOUNCE: Duration = Duration::from_millis(250);
pub const CANT_LOAD_DETAILS_MESSAGE: &str = "Can't load country details";
pub const DEFAULT_BASE_URL: &str = "https://restcountries.com/";
pub const DEFAULT_FIELDS: &str = "cca2,cca3,name,capital,currencies,flags";
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    HttpStatus,
    Deserialization,
    Storage,
    Validation,
    NotFound,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::HttpStatus => "HTTP_STATUS",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Storage)
    }
}

/// Failure surfaced across the repository and stream boundaries.
///
/// `message` is shown to the user as-is by the view-state engines, so it is
/// kept short and free of internal detail. Anything else goes in `context`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn from_http_status(status: u16) -> Self {
        let kind = match status {
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            _ => ErrorKind::HttpStatus,
        };
        Self::new(kind, format!("HTTP {status}")).with_context("http_status", status.to_string())
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
