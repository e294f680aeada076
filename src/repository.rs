use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::capabilities::CountriesApi;
use crate::model::{Country, CountryRecord};
use crate::store::CountryStore;
use crate::{AppError, AppResult};

/// Read/write facade over the local cache and the remote API.
///
/// Reads only ever touch the store. [`CountriesRepository::refresh`] writes
/// into the store and lets the store's change notifications reach observers.
#[async_trait::async_trait]
pub trait CountriesRepository: Send + Sync {
    /// All cached countries ordered by name; re-emits after every store write.
    fn observe_all(&self) -> BoxStream<'static, AppResult<Vec<Country>>>;

    /// The country with code `id`, or `None` while no such row exists.
    fn observe_one(&self, id: &str) -> BoxStream<'static, AppResult<Option<Country>>>;

    /// Fetch everything remotely and upsert it in one batch. Nothing is
    /// written unless the whole payload was fetched and converted.
    async fn refresh(&self) -> AppResult<()>;

    /// Case-insensitive name search over the cache only.
    async fn search(&self, query: &str) -> AppResult<Vec<Country>>;
}

pub struct CountryRepository {
    api: Arc<dyn CountriesApi>,
    store: Arc<dyn CountryStore>,
}

impl CountryRepository {
    pub fn new(api: Arc<dyn CountriesApi>, store: Arc<dyn CountryStore>) -> Self {
        Self { api, store }
    }
}

#[async_trait::async_trait]
impl CountriesRepository for CountryRepository {
    fn observe_all(&self) -> BoxStream<'static, AppResult<Vec<Country>>> {
        self.store
            .observe_all()
            .map(|result| {
                result
                    .map(|records| records.into_iter().map(Country::from).collect())
                    .map_err(AppError::from)
            })
            .boxed()
    }

    fn observe_one(&self, id: &str) -> BoxStream<'static, AppResult<Option<Country>>> {
        self.store
            .observe_one(id)
            .map(|result| {
                result
                    .map(|record| record.map(Country::from))
                    .map_err(AppError::from)
            })
            .boxed()
    }

    #[instrument(skip(self))]
    async fn refresh(&self) -> AppResult<()> {
        let dtos = self.api.fetch_all().await.map_err(|e| {
            warn!(error = %e, "remote fetch failed");
            AppError::from(e)
        })?;

        let records = dtos
            .into_iter()
            .map(CountryRecord::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                warn!(error = %e, "remote payload rejected");
                AppError::from(e)
            })?;

        let count = records.len();
        self.store.upsert_all(&records).await?;
        info!(count, "countries refreshed");
        Ok(())
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Country>> {
        let records = self.store.search(query).await?;
        Ok(records.into_iter().map(Country::from).collect())
    }
}
