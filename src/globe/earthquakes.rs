//! USGS earthquake feed.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::datasets::fallback_earthquakes;
use crate::aggregator::{Point, RemoteFeed};
use crate::error::Result;

/// Most recent quakes kept from the daily summary.
const MAX_QUAKES: usize = 20;

#[derive(Debug, Deserialize)]
struct QuakeCollection {
  features: Vec<QuakeFeature>,
}

#[derive(Debug, Deserialize)]
struct QuakeFeature {
  properties: QuakeProperties,
  geometry: QuakeGeometry,
}

#[derive(Debug, Deserialize)]
struct QuakeProperties {
  mag: Option<f64>,
  place: Option<String>,
  /// Milliseconds since epoch
  time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QuakeGeometry {
  /// [longitude, latitude, depth_km]
  coordinates: Vec<f64>,
}

impl QuakeFeature {
  fn into_point(self) -> Option<Point> {
    let lng = *self.geometry.coordinates.first()?;
    let lat = *self.geometry.coordinates.get(1)?;
    let place = self
      .properties
      .place
      .unwrap_or_else(|| "Unknown location".to_string());

    let mut point = Point::new(lat, lng, place, "Earthquake");
    if let Some(mag) = self.properties.mag {
      point = point
        .with("magnitude", mag)
        .with("description", format!("Magnitude {} earthquake", mag));
    }
    if let Some(depth) = self.geometry.coordinates.get(2) {
      point = point.with("depth_km", *depth);
    }
    if let Some(time) = self
      .properties
      .time
      .and_then(chrono::DateTime::from_timestamp_millis)
    {
      point = point.with("time", time.to_rfc3339());
    }
    Some(point)
  }
}

/// Daily earthquake summary from the USGS GeoJSON feed.
pub struct EarthquakeFeed {
  client: Client,
  url: Url,
}

impl EarthquakeFeed {
  pub fn new(client: Client, url: Url) -> Self {
    Self { client, url }
  }
}

#[async_trait]
impl RemoteFeed for EarthquakeFeed {
  fn name(&self) -> &str {
    "earthquakes"
  }

  async fn fetch(&self) -> Result<Vec<Point>> {
    let collection: QuakeCollection = self
      .client
      .get(self.url.clone())
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;

    Ok(
      collection
        .features
        .into_iter()
        .take(MAX_QUAKES)
        .filter_map(QuakeFeature::into_point)
        .collect(),
    )
  }

  fn fallback(&self) -> Vec<Point> {
    fallback_earthquakes()
  }
}
