//! External collaborators of the core: remote API, connectivity signal and the
//! local store. Each sits behind a trait so shells and tests can swap them.

mod connectivity;
mod http;

use std::sync::Arc;

pub use self::connectivity::{ConnectivityObserver, ShellConnectivity};
pub use self::http::{
    currencies_display, CountriesApi, CountryDto, CurrencyDto, FlagsDto, HttpError, NameDto,
    RestCountriesClient, ValidatedUrl,
};

use crate::config::ConfigError;
use crate::store::{CountryStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Everything the repository and engines need, wired once at start-up.
#[derive(Clone)]
pub struct Capabilities {
    pub store: Arc<dyn CountryStore>,
    pub api: Arc<dyn CountriesApi>,
    pub connectivity: Arc<dyn ConnectivityObserver>,
}

impl Capabilities {
    pub fn new(
        store: Arc<dyn CountryStore>,
        api: Arc<dyn CountriesApi>,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Self {
        Self {
            store,
            api,
            connectivity,
        }
    }
}
