use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config;
use crate::error::{Error, Result};

pub mod model;

pub use model::{process_forecast, WeatherReport};

/// Outbound weather and geocoding lookups. Both return the upstream JSON
/// untouched; [`process_forecast`] does the reduction.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<Value>;

    async fn suggestions(&self, query: &str) -> Result<Value>;
}

#[derive(Clone)]
pub struct OpenMeteoClient {
    http: Client,
    forecast_url: Url,
    geocoding_url: Url,
}

impl fmt::Debug for OpenMeteoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenMeteoClient")
            .field("forecast_url", &self.forecast_url)
            .field("geocoding_url", &self.geocoding_url)
            .finish_non_exhaustive()
    }
}

impl OpenMeteoClient {
    pub fn from_config(cfg: &config::Weather) -> Result<Self> {
        let forecast_url = Url::parse(&cfg.forecast_url)
            .map_err(|e| Error::bad_input(format!("weather.forecast_url: {e}")))?;
        let geocoding_url = Url::parse(&cfg.geocoding_url)
            .map_err(|e| Error::bad_input(format!("weather.geocoding_url: {e}")))?;
        let http = Client::builder()
            .user_agent(concat!("herdbook/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::upstream("Weather client setup failed", e))?;
        Ok(Self {
            http,
            forecast_url,
            geocoding_url,
        })
    }

    async fn get_json(&self, url: Url, context: &'static str) -> Result<Value> {
        debug!(%url, "weather request");
        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::upstream(context, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body = %body, "weather upstream returned error");
            return Err(Error::upstream(
                context,
                format!("request failed with status code {}", status.as_u16()),
            ));
        }
        let data: Value = resp.json().await.map_err(|e| Error::upstream(context, e))?;
        if !data.is_object() {
            return Err(Error::upstream(
                context,
                "Invalid API response: empty or non-JSON data",
            ));
        }
        Ok(data)
    }
}

#[async_trait]
impl WeatherService for OpenMeteoClient {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<Value> {
        let mut url = self.forecast_url.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &latitude.to_string())
            .append_pair("longitude", &longitude.to_string())
            .append_pair("hourly", &model::HOURLY_VARIABLES.join(","))
            .append_pair("daily", &model::DAILY_VARIABLES.join(","))
            .append_pair("timezone", "auto")
            .append_pair("forecast_days", &model::FORECAST_DAYS.to_string());
        let data = self.get_json(url, "Weather API fetch failed").await?;
        info!(latitude, longitude, "forecast fetched");
        Ok(data)
    }

    async fn suggestions(&self, query: &str) -> Result<Value> {
        let mut url = self.geocoding_url.clone();
        url.query_pairs_mut()
            .append_pair("name", query)
            .append_pair("count", "5");
        self.get_json(url, "Geocoding API fetch failed").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(forecast: &str) -> config::Weather {
        config::Weather {
            forecast_url: forecast.into(),
            geocoding_url: "http://127.0.0.1:9/v1/search".into(),
            timeout_ms: 500,
            default_latitude: -32.2968,
            default_longitude: 26.4194,
        }
    }

    #[test]
    fn rejects_unparseable_urls() {
        assert!(OpenMeteoClient::from_config(&cfg("not a url")).is_err());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_reported_not_hung() {
        // port 9 (discard) is closed on test machines
        let client = OpenMeteoClient::from_config(&cfg("http://127.0.0.1:9/v1/forecast")).unwrap();
        let err = client.forecast(-32.3, 26.4).await.unwrap_err();
        match err {
            Error::Upstream { context, .. } => assert_eq!(context, "Weather API fetch failed"),
            other => panic!("unexpected error {other:?}"),
        }
        let err = client.suggestions("Graaff").await.unwrap_err();
        assert!(err.to_string().starts_with("Geocoding API fetch failed"));
    }
}
