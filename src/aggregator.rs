//! Best-effort fan-out over independent remote feeds.
//!
//! Every feed is fetched concurrently under its own timeout. A feed that fails
//! or stalls contributes its fallback dataset instead, so one broken source
//! never empties or blocks the whole collection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// A point of interest on the globe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub lat: f64,
  pub lng: f64,
  pub label: String,
  pub category: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub attributes: BTreeMap<String, Value>,
}

impl Point {
  pub fn new(lat: f64, lng: f64, label: impl Into<String>, category: impl Into<String>) -> Self {
    Self {
      lat,
      lng,
      label: label.into(),
      category: category.into(),
      attributes: BTreeMap::new(),
    }
  }

  pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.attributes.insert(key.to_string(), value.into());
    self
  }
}

/// A pull-only external source of points.
#[async_trait]
pub trait RemoteFeed: Send + Sync {
  fn name(&self) -> &str;

  /// Fetch and normalize the live data.
  async fn fetch(&self) -> Result<Vec<Point>>;

  /// Deterministic substitute used when `fetch` fails.
  fn fallback(&self) -> Vec<Point>;
}

/// How a source contributed to a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
  Live,
  Fallback { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
  pub source: String,
  #[serde(flatten)]
  pub status: SourceStatus,
  pub points: usize,
}

/// Points from every source in source order, plus a report per source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationResult {
  pub points: Vec<Point>,
  pub sources: Vec<SourceReport>,
}

impl AggregationResult {
  pub fn fallback_sources(&self) -> impl Iterator<Item = &SourceReport> {
    self
      .sources
      .iter()
      .filter(|s| matches!(s.status, SourceStatus::Fallback { .. }))
  }
}

/// Runs feeds concurrently with a per-feed timeout.
#[derive(Debug, Clone)]
pub struct Aggregator {
  timeout: Duration,
}

impl Default for Aggregator {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
    }
  }
}

impl Aggregator {
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Collect from every source. Never fails as a whole.
  pub async fn collect(&self, sources: &[Arc<dyn RemoteFeed>]) -> AggregationResult {
    let fetches = sources.iter().map(|source| self.fetch_one(source.as_ref()));
    let outcomes = futures::future::join_all(fetches).await;

    let mut result = AggregationResult::default();
    for (source, outcome) in sources.iter().zip(outcomes) {
      let (points, status) = match outcome {
        Ok(points) => (points, SourceStatus::Live),
        Err(e) => {
          warn!(source = source.name(), error = %e, "feed failed, using fallback data");
          (
            source.fallback(),
            SourceStatus::Fallback {
              reason: e.to_string(),
            },
          )
        }
      };

      result.sources.push(SourceReport {
        source: source.name().to_string(),
        status,
        points: points.len(),
      });
      result.points.extend(points);
    }

    info!(
      sources = result.sources.len(),
      fallbacks = result.fallback_sources().count(),
      points = result.points.len(),
      "feeds collected"
    );
    result
  }

  async fn fetch_one(&self, source: &dyn RemoteFeed) -> Result<Vec<Point>> {
    tokio::time::timeout(self.timeout, source.fetch())
      .await
      .map_err(|_| Error::Timeout(self.timeout))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Fixed {
    name: &'static str,
    live: Option<Vec<Point>>,
    delay: Duration,
    fallback: Vec<Point>,
  }

  impl Fixed {
    fn ok(name: &'static str, n: usize) -> Self {
      Self {
        name,
        live: Some(points(name, "live", n)),
        delay: Duration::ZERO,
        fallback: points(name, "fallback", 1),
      }
    }

    fn failing(name: &'static str, fallback: usize) -> Self {
      Self {
        name,
        live: None,
        delay: Duration::ZERO,
        fallback: points(name, "fallback", fallback),
      }
    }

    fn slow(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
    }
  }

  fn points(name: &str, kind: &str, n: usize) -> Vec<Point> {
    (0..n)
      .map(|i| Point::new(i as f64, 0.0, format!("{}-{}-{}", name, kind, i), kind))
      .collect()
  }

  #[async_trait]
  impl RemoteFeed for Fixed {
    fn name(&self) -> &str {
      self.name
    }

    async fn fetch(&self) -> Result<Vec<Point>> {
      tokio::time::sleep(self.delay).await;
      self
        .live
        .clone()
        .ok_or_else(|| Error::remote(format!("{} unavailable", self.name)))
    }

    fn fallback(&self) -> Vec<Point> {
      self.fallback.clone()
    }
  }

  fn labels(result: &AggregationResult) -> Vec<&str> {
    result.points.iter().map(|p| p.label.as_str()).collect()
  }

  #[tokio::test]
  async fn test_failing_source_uses_fallback() {
    let sources: Vec<Arc<dyn RemoteFeed>> =
      vec![Arc::new(Fixed::ok("a", 2)), Arc::new(Fixed::failing("b", 3))];

    let result = Aggregator::default().collect(&sources).await;

    assert_eq!(
      labels(&result),
      vec!["a-live-0", "a-live-1", "b-fallback-0", "b-fallback-1", "b-fallback-2"]
    );
    assert_eq!(result.sources[0].status, SourceStatus::Live);
    assert!(matches!(
      result.sources[1].status,
      SourceStatus::Fallback { .. }
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_timed_out_source_keeps_order() {
    let sources: Vec<Arc<dyn RemoteFeed>> = vec![
      Arc::new(Fixed::ok("one", 2)),
      Arc::new(Fixed::ok("two", 4).slow(Duration::from_secs(60))),
      Arc::new(Fixed::ok("three", 1).slow(Duration::from_millis(500))),
    ];

    let result = Aggregator::new(Duration::from_secs(5)).collect(&sources).await;

    assert_eq!(result.points.len(), 2 + 1 + 1);
    assert_eq!(
      labels(&result),
      vec!["one-live-0", "one-live-1", "two-fallback-0", "three-live-0"]
    );
    assert_eq!(
      result.sources[1].status,
      SourceStatus::Fallback {
        reason: Error::Timeout(Duration::from_secs(5)).to_string()
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_sources_run_concurrently() {
    let sources: Vec<Arc<dyn RemoteFeed>> = vec![
      Arc::new(Fixed::ok("a", 1).slow(Duration::from_secs(3))),
      Arc::new(Fixed::ok("b", 1).slow(Duration::from_secs(3))),
    ];

    let started = tokio::time::Instant::now();
    let result = Aggregator::new(Duration::from_secs(5)).collect(&sources).await;

    assert_eq!(result.fallback_sources().count(), 0);
    assert!(started.elapsed() < Duration::from_secs(6));
  }

  #[tokio::test]
  async fn test_no_sources() {
    let result = Aggregator::default().collect(&[]).await;
    assert!(result.points.is_empty());
    assert!(result.sources.is_empty());
  }
}
