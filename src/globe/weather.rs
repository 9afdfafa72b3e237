//! OpenWeather current conditions for a fixed set of cities.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::datasets::{City, CITIES};
use crate::aggregator::{Point, RemoteFeed};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct Reading {
  main: ReadingMain,
  #[serde(default)]
  weather: Vec<ReadingSummary>,
  wind: Option<ReadingWind>,
}

#[derive(Debug, Deserialize)]
struct ReadingMain {
  temp: f64,
  humidity: u32,
  pressure: u32,
}

#[derive(Debug, Deserialize)]
struct ReadingSummary {
  description: String,
}

#[derive(Debug, Deserialize)]
struct ReadingWind {
  speed: f64,
}

impl Reading {
  fn into_point(self, city: &City) -> Point {
    let description = self
      .weather
      .into_iter()
      .next()
      .map(|w| w.description)
      .unwrap_or_default();

    Point::new(
      city.lat,
      city.lng,
      format!("{} Weather", city.name),
      "Weather Station",
    )
    .with("temperature", self.main.temp)
    .with("humidity", self.main.humidity)
    .with("pressure", self.main.pressure)
    .with("wind_speed", self.wind.map(|w| w.speed).unwrap_or(0.0))
    .with("description", description)
  }
}

/// Samples every city concurrently. A city whose reading fails gets its typical
/// conditions instead; the feed as a whole fails only when no city answered.
pub struct WeatherFeed {
  client: Client,
  url: Url,
  api_key: Option<String>,
}

impl WeatherFeed {
  pub fn new(client: Client, url: Url, api_key: Option<String>) -> Self {
    Self {
      client,
      url,
      api_key,
    }
  }

  async fn reading(&self, city: &City, api_key: &str) -> Result<Point> {
    let reading: Reading = self
      .client
      .get(self.url.clone())
      .query(&[("q", city.name), ("appid", api_key), ("units", "metric")])
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    Ok(reading.into_point(city))
  }
}

#[async_trait]
impl RemoteFeed for WeatherFeed {
  fn name(&self) -> &str {
    "weather"
  }

  async fn fetch(&self) -> Result<Vec<Point>> {
    let api_key = self
      .api_key
      .as_deref()
      .ok_or_else(|| Error::remote("no OpenWeather API key configured"))?;

    let readings =
      futures::future::join_all(CITIES.iter().map(|city| self.reading(city, api_key))).await;

    if readings.iter().all(|r| r.is_err()) {
      return Err(Error::remote("no city returned a weather reading"));
    }

    Ok(
      CITIES
        .iter()
        .zip(readings)
        .map(|(city, reading)| {
          reading.unwrap_or_else(|e| {
            debug!(city = city.name, error = %e, "weather reading failed");
            city.fallback_point()
          })
        })
        .collect(),
    )
  }

  fn fallback(&self) -> Vec<Point> {
    CITIES.iter().map(City::fallback_point).collect()
  }
}
