use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::CoreConfig;
use crate::model::CountryRecord;
use crate::{AppError, ErrorKind};

pub const MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    scheme: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, HttpError> {
        let url = url.into();
        Self::validate(&url)?;

        let parsed = Url::parse(&url).map_err(|e| HttpError::InvalidUrl {
            url: Self::truncate_url(&url),
            reason: e.to_string(),
        })?;

        let scheme = parsed.scheme().to_lowercase();
        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl {
                url: Self::truncate_url(&url),
                reason: "missing host".to_string(),
            })?
            .to_lowercase();

        Ok(Self {
            url: parsed.to_string(),
            scheme,
            host,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolves `path` against this URL. The base must end with `/` for the
    /// last segment to be kept.
    pub fn join(&self, path: &str) -> Result<Url, HttpError> {
        Url::parse(&self.url)
            .and_then(|base| base.join(path))
            .map_err(|e| HttpError::InvalidUrl {
                url: Self::truncate_url(&format!("{}{path}", self.url)),
                reason: e.to_string(),
            })
    }

    fn validate(url: &str) -> Result<(), HttpError> {
        if url.trim().is_empty() {
            return Err(HttpError::InvalidUrl {
                url: url.to_string(),
                reason: "URL cannot be empty".to_string(),
            });
        }

        if url.len() > MAX_URL_LENGTH {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            });
        }

        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl {
            url: Self::truncate_url(url),
            reason: e.to_string(),
        })?;

        let scheme = parsed.scheme().to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: format!(
                    "invalid scheme '{scheme}', only 'http' and 'https' are allowed"
                ),
            });
        }

        if parsed.host_str().is_none() {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: "URL must have a host".to_string(),
            });
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: "credentials in URL are not allowed".to_string(),
            });
        }

        Ok(())
    }

    fn truncate_url(url: &str) -> String {
        if url.len() <= 100 {
            url.to_string()
        } else {
            let cut = (0..=100).rev().find(|i| url.is_char_boundary(*i)).unwrap_or(0);
            format!("{}...", &url[..cut])
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {message}")]
    ClientBuild { message: String },

    #[error("connection failed to {host}: {message}")]
    ConnectionError { host: String, message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },

    #[error("HTTP {status}")]
    HttpStatus {
        status: u16,
        request_id: String,
        retryable: bool,
    },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String, request_id: String },

    #[error("invalid country record: {reason}")]
    InvalidRecord { reason: String },
}

impl HttpError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Timeout { .. } | HttpError::ConnectionError { .. } => true,
            HttpError::HttpStatus { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            HttpError::Timeout { request_id, .. }
            | HttpError::HttpStatus { request_id, .. }
            | HttpError::InvalidResponse { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        let err = match &e {
            HttpError::HttpStatus { status, .. } => AppError::from_http_status(*status),
            HttpError::Timeout { .. } => AppError::new(ErrorKind::Timeout, e.to_string()),
            HttpError::ConnectionError { .. } => AppError::new(ErrorKind::Network, e.to_string()),
            HttpError::InvalidResponse { .. } | HttpError::InvalidRecord { .. } => {
                AppError::new(ErrorKind::Deserialization, e.to_string())
            }
            HttpError::InvalidUrl { .. } | HttpError::ClientBuild { .. } => {
                AppError::new(ErrorKind::Internal, e.to_string())
            }
        };
        match e.request_id() {
            Some(id) => err.with_context("request_id", id),
            None => err,
        }
    }
}

// --- Wire format of the countries endpoint ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryDto {
    pub name: NameDto,
    pub cca3: String,
    #[serde(default)]
    pub currencies: BTreeMap<String, CurrencyDto>,
    #[serde(default)]
    pub capital: Vec<String>,
    #[serde(default)]
    pub flags: Option<FlagsDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameDto {
    pub common: String,
    #[serde(default)]
    pub official: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CurrencyDto {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlagsDto {
    #[serde(default)]
    pub png: Option<String>,
    #[serde(default)]
    pub svg: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

/// `"Euro (€), Swiss franc (Fr.)"`, ordered by currency code.
pub fn currencies_display(currencies: &BTreeMap<String, CurrencyDto>) -> String {
    currencies
        .iter()
        .map(|(code, currency)| {
            let name = currency
                .name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(code);
            match currency.symbol.as_deref().filter(|s| !s.trim().is_empty()) {
                Some(symbol) => format!("{name} ({symbol})"),
                None => name.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl TryFrom<CountryDto> for CountryRecord {
    type Error = HttpError;

    fn try_from(dto: CountryDto) -> Result<Self, Self::Error> {
        let cca3 = dto.cca3.trim().to_string();
        if cca3.is_empty() {
            return Err(HttpError::InvalidRecord {
                reason: format!("missing cca3 for '{}'", dto.name.common),
            });
        }
        if dto.name.common.trim().is_empty() {
            return Err(HttpError::InvalidRecord {
                reason: format!("missing common name for {cca3}"),
            });
        }

        let flag = dto.flags.as_ref().and_then(|f| {
            let usable = |url: Option<&str>| url.filter(|u| !u.trim().is_empty()).map(str::to_string);
            usable(f.png.as_deref()).or_else(|| usable(f.svg.as_deref()))
        });

        Ok(Self {
            currencies: currencies_display(&dto.currencies),
            capital: dto.capital.into_iter().next(),
            flag,
            name: dto.name.common,
            cca3,
        })
    }
}

/// Remote source of country records.
#[async_trait::async_trait]
pub trait CountriesApi: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<CountryDto>, HttpError>;
    async fn fetch_by_name(&self, name: &str) -> Result<Vec<CountryDto>, HttpError>;
}

pub struct RestCountriesClient {
    client: reqwest::Client,
    base_url: ValidatedUrl,
    fields: String,
    timeout: Duration,
}

impl RestCountriesClient {
    pub fn new(config: &CoreConfig) -> Result<Self, HttpError> {
        let base_url = ValidatedUrl::new(config.base_url.clone())?;
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::ClientBuild {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            fields: config.fields.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &ValidatedUrl {
        &self.base_url
    }

    fn all_url(&self) -> Result<Url, HttpError> {
        let mut url = self.base_url.join("v3.1/all")?;
        url.query_pairs_mut().append_pair("fields", &self.fields);
        Ok(url)
    }

    fn by_name_url(&self, name: &str) -> Result<Url, HttpError> {
        let mut url = self.base_url.join("v3.1/name/")?;
        url.path_segments_mut()
            .map_err(|()| HttpError::InvalidUrl {
                url: self.base_url.as_str().to_string(),
                reason: "base URL cannot carry path segments".to_string(),
            })?
            .pop_if_empty()
            .push(name);
        url.query_pairs_mut().append_pair("fields", &self.fields);
        Ok(url)
    }

    async fn get_countries(&self, url: Url) -> Result<Vec<CountryDto>, HttpError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| {
            let err = self.transport_error(&e, &request_id);
            error!(request_id = %request_id, error = %e, "request failed");
            err
        })?;

        let status = response.status();
        debug!(
            request_id = %request_id,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "response received"
        );

        if !status.is_success() {
            return Err(HttpError::HttpStatus {
                status: status.as_u16(),
                retryable: status.is_server_error() || status.as_u16() == 429,
                request_id,
            });
        }

        let body = response.bytes().await.map_err(|e| {
            error!(request_id = %request_id, error = %e, "failed reading body");
            self.transport_error(&e, &request_id)
        })?;

        serde_json::from_slice(&body).map_err(|e| HttpError::InvalidResponse {
            reason: format!("failed to parse JSON: {e}"),
            request_id,
        })
    }

    fn transport_error(&self, e: &reqwest::Error, request_id: &str) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                request_id: request_id.to_string(),
            }
        } else {
            HttpError::ConnectionError {
                host: self.base_url.host().to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl CountriesApi for RestCountriesClient {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<CountryDto>, HttpError> {
        let url = self.all_url()?;
        self.get_countries(url).await
    }

    #[instrument(skip(self))]
    async fn fetch_by_name(&self, name: &str) -> Result<Vec<CountryDto>, HttpError> {
        let url = self.by_name_url(name)?;
        match self.get_countries(url).await {
            Err(HttpError::HttpStatus { status: 404, .. }) => Ok(Vec::new()),
            other => other,
        }
    }
}
