use futures_util::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use thiserror::Error;
use tokio::sync::watch;

use crate::model::CountryRecord;
use crate::{AppError, ErrorKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("lock acquisition failed")]
    LockFailed,

    #[error("storage task failed: {0}")]
    TaskFailed(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::new(ErrorKind::Storage, e.to_string())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Durable country cache keyed by `cca3`.
///
/// Observation streams emit the current result right away and again after
/// every committed write. A failing query is yielded once and ends the stream.
#[async_trait::async_trait]
pub trait CountryStore: Send + Sync {
    /// Insert-or-replace the whole batch atomically.
    async fn upsert_all(&self, records: &[CountryRecord]) -> Result<(), StoreError>;
    async fn clear_all(&self) -> Result<(), StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
    /// Case-insensitive substring match on `name`, ordered by name.
    async fn search(&self, query: &str) -> Result<Vec<CountryRecord>, StoreError>;
    async fn get(&self, cca3: &str) -> Result<Option<CountryRecord>, StoreError>;
    fn observe_all(&self) -> BoxStream<'static, Result<Vec<CountryRecord>, StoreError>>;
    fn observe_one(&self, cca3: &str)
        -> BoxStream<'static, Result<Option<CountryRecord>, StoreError>>;
}

/// Re-runs `query` on subscribe and on every version bump of `changes`.
pub fn observe_query<T, F, Fut>(
    changes: watch::Receiver<u64>,
    query: F,
) -> BoxStream<'static, Result<T, StoreError>>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    stream::unfold(Some((changes, query, true)), |state| async move {
        let (mut changes, query, first) = state?;
        if !first && changes.changed().await.is_err() {
            return None;
        }
        changes.borrow_and_update();

        let result = query().await;
        let next = result.is_ok().then_some((changes, query, false));
        Some((result, next))
    })
    .boxed()
}

pub(crate) fn matches_name(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::sqlite::SqliteCountryStore;

#[cfg(not(target_arch = "wasm32"))]
mod sqlite {
    use rusqlite::{params, Connection, OptionalExtension, Row};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;
    use tracing::{debug, info, instrument};

    use super::{matches_name, observe_query, CountryStore, StoreError};
    use crate::model::CountryRecord;
    use futures_util::stream::BoxStream;

    const SCHEMA: &str = r"
        CREATE TABLE IF NOT EXISTS countries (
            cca3 TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            capital TEXT,
            flag TEXT,
            currencies TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_countries_name ON countries(name);
    ";

    const SELECT_COLUMNS: &str = "SELECT cca3, name, capital, flag, currencies FROM countries";

    struct Shared {
        conn: Mutex<Connection>,
        changes: watch::Sender<u64>,
    }

    impl Shared {
        fn with_conn<T>(
            &self,
            f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
        ) -> Result<T, StoreError> {
            let mut conn = self.conn.lock().map_err(|_| StoreError::LockFailed)?;
            f(&mut conn)
        }

        fn notify(&self) {
            self.changes.send_modify(|version| *version = version.wrapping_add(1));
        }
    }

    /// SQLite-backed store. One connection, serialised behind a mutex; every
    /// call runs on the blocking pool.
    #[derive(Clone)]
    pub struct SqliteCountryStore {
        shared: Arc<Shared>,
    }

    impl SqliteCountryStore {
        pub fn open(path: &Path) -> Result<Self, StoreError> {
            let conn = Connection::open(path)?;
            info!(path = %path.display(), "opened country store");
            Self::from_connection(conn)
        }

        pub fn open_in_memory() -> Result<Self, StoreError> {
            Self::from_connection(Connection::open_in_memory()?)
        }

        fn from_connection(conn: Connection) -> Result<Self, StoreError> {
            conn.execute_batch(SCHEMA)?;
            let (changes, _rx) = watch::channel(0);
            Ok(Self {
                shared: Arc::new(Shared {
                    conn: Mutex::new(conn),
                    changes,
                }),
            })
        }

        async fn run<T, F>(shared: &Arc<Shared>, f: F) -> Result<T, StoreError>
        where
            T: Send + 'static,
            F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        {
            let shared = Arc::clone(shared);
            tokio::task::spawn_blocking(move || shared.with_conn(f))
                .await
                .map_err(|e| StoreError::TaskFailed(e.to_string()))?
        }
    }

    fn read_record(row: &Row<'_>) -> rusqlite::Result<CountryRecord> {
        Ok(CountryRecord {
            cca3: row.get(0)?,
            name: row.get(1)?,
            capital: row.get(2)?,
            flag: row.get(3)?,
            currencies: row.get(4)?,
        })
    }

    fn select_all(conn: &mut Connection) -> Result<Vec<CountryRecord>, StoreError> {
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY name ASC, cca3 ASC"))?;
        let rows = stmt.query_map([], read_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn select_one(conn: &mut Connection, cca3: &str) -> Result<Option<CountryRecord>, StoreError> {
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE cca3 = ?1 LIMIT 1"))?;
        Ok(stmt.query_row(params![cca3], read_record).optional()?)
    }

    #[async_trait::async_trait]
    impl CountryStore for SqliteCountryStore {
        #[instrument(skip(self, records), fields(count = records.len()))]
        async fn upsert_all(&self, records: &[CountryRecord]) -> Result<(), StoreError> {
            let records = records.to_vec();
            Self::run(&self.shared, move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        r"
                        INSERT INTO countries (cca3, name, capital, flag, currencies)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        ON CONFLICT(cca3) DO UPDATE SET
                            name = excluded.name,
                            capital = excluded.capital,
                            flag = excluded.flag,
                            currencies = excluded.currencies
                        ",
                    )?;
                    for record in &records {
                        stmt.execute(params![
                            record.cca3,
                            record.name,
                            record.capital,
                            record.flag,
                            record.currencies
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

            self.shared.notify();
            debug!("batch committed");
            Ok(())
        }

        #[instrument(skip(self))]
        async fn clear_all(&self) -> Result<(), StoreError> {
            Self::run(&self.shared, |conn| {
                conn.execute("DELETE FROM countries", [])?;
                Ok(())
            })
            .await?;
            self.shared.notify();
            Ok(())
        }

        async fn count(&self) -> Result<usize, StoreError> {
            Self::run(&self.shared, |conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM countries", [], |row| row.get(0))?;
                Ok(usize::try_from(count).unwrap_or(0))
            })
            .await
        }

        async fn search(&self, query: &str) -> Result<Vec<CountryRecord>, StoreError> {
            let query = query.to_string();
            Self::run(&self.shared, move |conn| {
                let all = select_all(conn)?;
                Ok(all
                    .into_iter()
                    .filter(|record| matches_name(&record.name, &query))
                    .collect())
            })
            .await
        }

        async fn get(&self, cca3: &str) -> Result<Option<CountryRecord>, StoreError> {
            let cca3 = cca3.to_string();
            Self::run(&self.shared, move |conn| select_one(conn, &cca3)).await
        }

        fn observe_all(&self) -> BoxStream<'static, Result<Vec<CountryRecord>, StoreError>> {
            let shared = Arc::clone(&self.shared);
            observe_query(self.shared.changes.subscribe(), move || {
                let shared = Arc::clone(&shared);
                async move { Self::run(&shared, select_all).await }
            })
        }

        fn observe_one(
            &self,
            cca3: &str,
        ) -> BoxStream<'static, Result<Option<CountryRecord>, StoreError>> {
            let shared = Arc::clone(&self.shared);
            let cca3 = cca3.to_string();
            observe_query(self.shared.changes.subscribe(), move || {
                let shared = Arc::clone(&shared);
                let cca3 = cca3.clone();
                async move { Self::run(&shared, move |conn| select_one(conn, &cca3)).await }
            })
        }
    }

}
