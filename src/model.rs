use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AppError;

/// Stable three-letter country code (`cca3`), primary key everywhere.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryId(String);

impl CountryId {
    pub fn new(id: impl Into<String>) -> Result<Self, AppError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::validation("country id cannot be blank"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub capital: Option<String>,
    pub currencies_display: String,
    pub flag_url: Option<String>,
}

/// Row of the `countries` table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CountryRecord {
    pub cca3: String,
    pub name: String,
    pub capital: Option<String>,
    pub flag: Option<String>,
    pub currencies: String,
}

impl From<CountryRecord> for Country {
    fn from(record: CountryRecord) -> Self {
        Self {
            id: CountryId(record.cca3),
            name: record.name,
            capital: record.capital.filter(|c| !c.is_empty()),
            currencies_display: record.currencies,
            flag_url: record.flag.filter(|f| !f.is_empty()),
        }
    }
}

impl From<&Country> for CountryRecord {
    fn from(country: &Country) -> Self {
        Self {
            cca3: country.id.as_str().to_string(),
            name: country.name.clone(),
            capital: country.capital.clone(),
            flag: country.flag_url.clone(),
            currencies: country.currencies_display.clone(),
        }
    }
}

/// Row projection rendered by the countries list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListItem {
    pub id: String,
    pub name: String,
    pub flag_url: Option<String>,
}

impl From<&Country> for ListItem {
    fn from(country: &Country) -> Self {
        Self {
            id: country.id.as_str().to_string(),
            name: country.name.clone(),
            flag_url: country.flag_url.clone(),
        }
    }
}

/// Detail projection. Every field is optional so "not loaded" and "not found"
/// render as an empty card.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct CountryDetail {
    pub country_flag: Option<String>,
    pub country_name: Option<String>,
    pub capital_name: Option<String>,
    pub country_currencies: Option<String>,
}

impl From<&Country> for CountryDetail {
    fn from(country: &Country) -> Self {
        Self {
            country_flag: country.flag_url.clone(),
            country_name: Some(country.name.clone()),
            capital_name: country.capital.clone(),
            country_currencies: Some(country.currencies_display.clone()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectivityStatus {
    #[default]
    Online,
    Offline,
}

/// Shared shape of every screen state: a loading flag and an error banner.
pub trait UiState: Clone + Send + Sync + 'static {
    #[must_use]
    fn with_loading(self, value: bool) -> Self;
    #[must_use]
    fn with_error(self, value: Option<String>) -> Self;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ListUiState {
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub query: String,
    pub items: Vec<ListItem>,
    pub connectivity_status: ConnectivityStatus,
}

impl ListUiState {
    /// State before the first snapshot arrives.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }
}

impl UiState for ListUiState {
    fn with_loading(self, value: bool) -> Self {
        Self {
            is_loading: value,
            ..self
        }
    }

    fn with_error(self, value: Option<String>) -> Self {
        Self {
            error_message: value,
            ..self
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct DetailUiState {
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub detail: CountryDetail,
}

impl UiState for DetailUiState {
    fn with_loading(self, value: bool) -> Self {
        Self {
            is_loading: value,
            ..self
        }
    }

    fn with_error(self, value: Option<String>) -> Self {
        Self {
            error_message: value,
            ..self
        }
    }
}
