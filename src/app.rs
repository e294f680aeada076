use std::sync::Arc;
use tracing::{info, instrument};

use crate::capabilities::{Capabilities, CapabilityError, ConnectivityObserver, RestCountriesClient};
use crate::config::CoreConfig;
use crate::repository::{CountriesRepository, CountryRepository};
use crate::store::SqliteCountryStore;
use crate::view_state::{CountriesListEngine, CountryDetailsEngine};

/// Composition root. Owns the wired capabilities and hands out engines that
/// share one repository.
pub struct CountriesCore {
    config: CoreConfig,
    capabilities: Capabilities,
    repository: Arc<dyn CountriesRepository>,
}

impl CountriesCore {
    /// Opens the cache (on disk when `database_path` is set) and builds the
    /// REST client from `config`.
    #[instrument(skip_all)]
    pub fn open(
        config: CoreConfig,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Result<Self, CapabilityError> {
        config.validate()?;

        let store = match &config.database_path {
            Some(path) => SqliteCountryStore::open(path)?,
            None => SqliteCountryStore::open_in_memory()?,
        };
        let api = RestCountriesClient::new(&config)?;
        info!(base_url = %config.base_url, persistent = config.database_path.is_some(), "countries core opened");

        Ok(Self::with_capabilities(
            config,
            Capabilities::new(Arc::new(store), Arc::new(api), connectivity),
        ))
    }

    pub fn with_capabilities(config: CoreConfig, capabilities: Capabilities) -> Self {
        let repository: Arc<dyn CountriesRepository> = Arc::new(CountryRepository::new(
            Arc::clone(&capabilities.api),
            Arc::clone(&capabilities.store),
        ));
        Self {
            config,
            capabilities,
            repository,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn CountriesRepository> {
        Arc::clone(&self.repository)
    }

    /// Must be called inside a tokio runtime.
    pub fn list_engine(&self) -> CountriesListEngine {
        CountriesListEngine::new(
            self.repository(),
            Arc::clone(&self.capabilities.connectivity),
            self.config.query_debounce(),
        )
    }

    pub fn details_engine(&self) -> CountryDetailsEngine {
        CountryDetailsEngine::new(self.repository(), self.config.missing_country_policy)
    }
}
