//! Backend HTTP Client
//!
//! `reqwest` adapter for the [`SyncDataSource`] port.
//!
//! - trades: `GET {QX_API_URL}/getTrades`, a JSON array
//! - overview: `GET {BACKEND_API_URL}/qtreatz/overview`, a JSON object or array
//!
//! No retries here. A failed refetch is reported to the caller and the
//! next pushed event tries again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::application::ports::{FetchError, SyncDataSource};
use crate::domain::market::{QTreatzOverview, Trade};
use crate::infrastructure::config::SyncConfig;
use crate::infrastructure::metrics::{self, Resource};

/// HTTP client for the QX API and the explorer backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    trades_url: String,
    overview_url: String,
}

impl BackendClient {
    /// Create a client for the given base URLs.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(qx_api_url: &str, backend_api_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            trades_url: format!("{}/getTrades", qx_api_url.trim_end_matches('/')),
            overview_url: format!("{}/qtreatz/overview", backend_api_url.trim_end_matches('/')),
        })
    }

    /// Create a client from service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.http.qx_api_url,
            &config.backend_api_base(),
            config.http.timeout,
        )
    }

    /// URL used for trade fetches.
    #[must_use]
    pub fn trades_url(&self) -> &str {
        &self.trades_url
    }

    /// URL used for overview fetches.
    #[must_use]
    pub fn overview_url(&self) -> &str {
        &self.overview_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: Resource) -> Result<T, FetchError> {
        let started = Instant::now();
        let result = self.send_get(url).await;
        metrics::record_fetch_duration(resource, started.elapsed());

        if let Err(e) = &result {
            tracing::debug!(url, error = %e, "Backend fetch failed");
        }
        result
    }

    async fn send_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SyncDataSource for BackendClient {
    async fn fetch_trades(&self) -> Result<Vec<Trade>, FetchError> {
        self.get_json(&self.trades_url, Resource::Trades).await
    }

    async fn fetch_qtreatz_overview(&self) -> Result<QTreatzOverview, FetchError> {
        self.get_json(&self.overview_url, Resource::QTreatzOverview)
            .await
    }
}
