//! Weather lookup for the tag accompanying a schedule trigger.
//!
//! Fetches the next forecast hour from open-meteo and folds it into one
//! of four coarse conditions.  Strictly decorative; every failure path
//! is non-fatal.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use wakemat_proto::WeatherCondition;

const API_URL: &str = "https://api.open-meteo.com/v1/forecast";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WeatherService {
    http: reqwest::Client,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    hourly: Hourly,
}

#[derive(Debug, Deserialize)]
struct Hourly {
    precipitation_probability: Vec<f64>,
    cloudcover: Vec<f64>,
}

/// Fold raw forecast numbers into a coarse condition.
pub(crate) fn classify(precipitation_probability: f64, cloud_cover: f64) -> WeatherCondition {
    if precipitation_probability > 50.0 {
        WeatherCondition::Rainy
    } else if cloud_cover < 30.0 {
        WeatherCondition::Sunny
    } else if cloud_cover <= 70.0 {
        WeatherCondition::PartlyCloudy
    } else {
        WeatherCondition::Cloudy
    }
}

impl WeatherService {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            latitude,
            longitude,
        }
    }

    /// Current condition from the first forecast hour.
    pub async fn current(&self) -> Result<WeatherCondition> {
        let forecast: Forecast = self
            .http
            .get(API_URL)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                (
                    "hourly",
                    "precipitation_probability,cloudcover".to_string(),
                ),
                ("forecast_days", "1".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .context("weather request failed")?
            .error_for_status()
            .context("weather api rejected the request")?
            .json()
            .await
            .context("weather response is not the expected json")?;

        let precipitation = forecast
            .hourly
            .precipitation_probability
            .first()
            .copied()
            .context("forecast has no precipitation data")?;
        let cloud_cover = forecast
            .hourly
            .cloudcover
            .first()
            .copied()
            .context("forecast has no cloud cover data")?;

        Ok(classify(precipitation, cloud_cover))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
