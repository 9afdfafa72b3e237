//! Globe layers: live geophysical feeds plus fixed reference datasets.

mod datasets;
mod earthquakes;
mod weather;

use std::sync::Arc;

use color_eyre::Result;
use reqwest::Client;
use url::Url;

use crate::aggregator::{AggregationResult, Aggregator, RemoteFeed};
use crate::config::GlobeConfig;

pub use datasets::{airports, fallback_earthquakes, satellites, volcanoes, City, StaticFeed, CITIES};
pub use earthquakes::EarthquakeFeed;
pub use weather::WeatherFeed;

/// Every globe layer behind one aggregator.
pub struct GlobeService {
  aggregator: Aggregator,
  feeds: Vec<Arc<dyn RemoteFeed>>,
}

impl GlobeService {
  pub fn new(aggregator: Aggregator, feeds: Vec<Arc<dyn RemoteFeed>>) -> Self {
    Self { aggregator, feeds }
  }

  /// Wire the live and static feeds, sharing `client` between the live ones.
  pub fn from_config(
    config: &GlobeConfig,
    client: Client,
    weather_api_key: Option<String>,
  ) -> Result<Self> {
    let feeds: Vec<Arc<dyn RemoteFeed>> = vec![
      Arc::new(EarthquakeFeed::new(
        client.clone(),
        Url::parse(&config.earthquakes_url)?,
      )),
      Arc::new(WeatherFeed::new(
        client,
        Url::parse(&config.weather_url)?,
        weather_api_key,
      )),
      Arc::new(StaticFeed::volcanoes()),
      Arc::new(StaticFeed::satellites()),
      Arc::new(StaticFeed::airports()),
    ];

    Ok(Self::new(Aggregator::new(config.feed_timeout()), feeds))
  }

  pub fn feed_names(&self) -> Vec<&str> {
    self.feeds.iter().map(|f| f.name()).collect()
  }

  pub async fn layers(&self) -> AggregationResult {
    self.aggregator.collect(&self.feeds).await
  }
}
